//! HR and payroll domain module (event-sourced): departments, employees and
//! monthly payslips with statutory deductions.

pub mod department;
pub mod employee;
pub mod payroll;
pub mod payslip;

pub use department::{
    CreateDepartment, Department, DepartmentCommand, DepartmentCreated, DepartmentEvent,
    DepartmentId, DepartmentRenamed, RenameDepartment,
};
pub use employee::{
    Employee, EmployeeCommand, EmployeeEvent, EmployeeHired, EmployeeId, EmployeeTerminated,
    EmployeeTransferred, HireEmployee, ReviseSalary, SalaryRevised, SalaryRevision,
    TerminateEmployee, TransferEmployee,
};
pub use payroll::{PayPeriod, PayslipBreakdown, SalaryStructure, compute_payslip, professional_tax};
pub use payslip::{
    ApprovePayslip, GeneratePayslip, MarkPayslipPaid, Payslip, PayslipApproved, PayslipCommand,
    PayslipEvent, PayslipGenerated, PayslipId, PayslipPaid, PayslipStatus,
};
