use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id};
use estateerp_events::Event;

use crate::contact::{normalize_email, normalize_phone};
use crate::customer::CustomerId;

define_aggregate_id!(
    /// Lead identifier.
    LeadId
);

/// Pipeline stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    SiteVisit,
    Negotiation,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::SiteVisit => "site_visit",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "new" => Some(LeadStatus::New),
            "contacted" => Some(LeadStatus::Contacted),
            "site_visit" | "sitevisit" => Some(LeadStatus::SiteVisit),
            "negotiation" => Some(LeadStatus::Negotiation),
            "won" => Some(LeadStatus::Won),
            "lost" => Some(LeadStatus::Lost),
            _ => None,
        }
    }

    /// Allowed pipeline moves. Won is terminal; Lost can only be reopened.
    pub fn can_move_to(self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, next),
            (New, Contacted | Lost)
                | (Contacted, SiteVisit | Negotiation | Lost)
                | (SiteVisit, Negotiation | Lost)
                | (Negotiation, Won | Lost)
                | (Lost, Contacted)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub note: String,
    pub next_follow_up: Option<NaiveDate>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate root: Lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    id: LeadId,
    tenant_id: Option<TenantId>,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    status: LeadStatus,
    agent: Option<String>,
    follow_ups: Vec<FollowUp>,
    customer_id: Option<CustomerId>,
    version: u64,
    created: bool,
}

impl Lead {
    pub fn empty(id: LeadId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            phone: None,
            email: None,
            status: LeadStatus::New,
            agent: None,
            follow_ups: Vec::new(),
            customer_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn follow_ups(&self) -> &[FollowUp] {
        &self.follow_ups
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }
}

impl AggregateRoot for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    /// What the lead is looking for, e.g. "2BHK, Tower B".
    pub interest: Option<String>,
    pub budget: Option<Paise>,
    /// Imported leads keep their original stage.
    pub status: Option<LeadStatus>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub agent: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLeadStatus {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub status: LeadStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFollowUp {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub note: String,
    pub next_follow_up: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadCommand {
    CaptureLead(CaptureLead),
    AssignLead(AssignLead),
    ChangeLeadStatus(ChangeLeadStatus),
    AddFollowUp(AddFollowUp),
    ConvertLead(ConvertLead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCaptured {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub interest: Option<String>,
    pub budget: Option<Paise>,
    pub status: LeadStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAssigned {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub agent: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStatusChanged {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub from: LeadStatus,
    pub to: LeadStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpAdded {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub follow_up: FollowUp,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConverted {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadEvent {
    LeadCaptured(LeadCaptured),
    LeadAssigned(LeadAssigned),
    LeadStatusChanged(LeadStatusChanged),
    FollowUpAdded(FollowUpAdded),
    LeadConverted(LeadConverted),
}

impl Event for LeadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::LeadCaptured(_) => "crm.lead.captured",
            LeadEvent::LeadAssigned(_) => "crm.lead.assigned",
            LeadEvent::LeadStatusChanged(_) => "crm.lead.status_changed",
            LeadEvent::FollowUpAdded(_) => "crm.lead.follow_up_added",
            LeadEvent::LeadConverted(_) => "crm.lead.converted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeadEvent::LeadCaptured(e) => e.occurred_at,
            LeadEvent::LeadAssigned(e) => e.occurred_at,
            LeadEvent::LeadStatusChanged(e) => e.occurred_at,
            LeadEvent::FollowUpAdded(e) => e.occurred_at,
            LeadEvent::LeadConverted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lead {
    type Command = LeadCommand;
    type Event = LeadEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::LeadCaptured(e) => {
                self.id = e.lead_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.email = e.email.clone();
                self.status = e.status;
                self.created = true;
            }
            LeadEvent::LeadAssigned(e) => {
                self.agent = Some(e.agent.clone());
            }
            LeadEvent::LeadStatusChanged(e) => {
                self.status = e.to;
            }
            LeadEvent::FollowUpAdded(e) => {
                self.follow_ups.push(e.follow_up.clone());
            }
            LeadEvent::LeadConverted(e) => {
                self.customer_id = Some(e.customer_id);
                self.status = LeadStatus::Won;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeadCommand::CaptureLead(cmd) => self.handle_capture(cmd),
            LeadCommand::AssignLead(cmd) => self.handle_assign(cmd),
            LeadCommand::ChangeLeadStatus(cmd) => self.handle_status(cmd),
            LeadCommand::AddFollowUp(cmd) => self.handle_follow_up(cmd),
            LeadCommand::ConvertLead(cmd) => self.handle_convert(cmd),
        }
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Lead {
    fn ensure_existing(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != lead_id {
            return Err(DomainError::invariant("lead_id mismatch"));
        }
        Ok(())
    }

    fn handle_capture(&self, cmd: &CaptureLead) -> Result<Vec<LeadEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lead already exists"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("lead name cannot be empty"));
        }
        let phone = normalize_phone(cmd.phone.as_deref())?;
        let email = normalize_email(cmd.email.as_deref())?;
        if phone.is_none() && email.is_none() {
            return Err(DomainError::validation("a lead needs a phone number or an email"));
        }
        if matches!(cmd.budget, Some(b) if b < 0) {
            return Err(DomainError::validation("budget cannot be negative"));
        }

        Ok(vec![LeadEvent::LeadCaptured(LeadCaptured {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            name: name.to_string(),
            phone,
            email,
            source: trimmed(&cmd.source),
            interest: trimmed(&cmd.interest),
            budget: cmd.budget,
            status: cmd.status.unwrap_or(LeadStatus::New),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        let agent = cmd.agent.trim();
        if agent.is_empty() {
            return Err(DomainError::validation("agent cannot be empty"));
        }
        if self.status == LeadStatus::Won {
            return Err(DomainError::invariant("won leads cannot be reassigned"));
        }
        Ok(vec![LeadEvent::LeadAssigned(LeadAssigned {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            agent: agent.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_status(&self, cmd: &ChangeLeadStatus) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        if cmd.status == LeadStatus::Won {
            return Err(DomainError::invariant(
                "leads are won by converting them to a customer",
            ));
        }
        if !self.status.can_move_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move lead from {} to {}",
                self.status.as_str(),
                cmd.status.as_str()
            )));
        }
        Ok(vec![LeadEvent::LeadStatusChanged(LeadStatusChanged {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            from: self.status,
            to: cmd.status,
            note: trimmed(&cmd.note),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_follow_up(&self, cmd: &AddFollowUp) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        let note = cmd.note.trim();
        if note.is_empty() {
            return Err(DomainError::validation("follow-up note cannot be empty"));
        }
        if matches!(self.status, LeadStatus::Won | LeadStatus::Lost) {
            return Err(DomainError::invariant("closed leads take no follow-ups"));
        }
        Ok(vec![LeadEvent::FollowUpAdded(FollowUpAdded {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            follow_up: FollowUp {
                note: note.to_string(),
                next_follow_up: cmd.next_follow_up,
                recorded_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        if self.status != LeadStatus::Negotiation {
            return Err(DomainError::invariant(
                "only leads in negotiation can be converted",
            ));
        }
        Ok(vec![LeadEvent::LeadConverted(LeadConverted {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn captured() -> (Lead, TenantId, LeadId) {
        let tenant_id = TenantId::new();
        let lead_id = LeadId::generate();
        let mut lead = Lead::empty(lead_id);
        execute(
            &mut lead,
            &LeadCommand::CaptureLead(CaptureLead {
                tenant_id,
                lead_id,
                name: "Rohan Mehta".to_string(),
                phone: Some("9820012345".to_string()),
                email: None,
                source: Some("walk-in".to_string()),
                interest: Some("3BHK".to_string()),
                budget: Some(1_50_00_000_00),
                status: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (lead, tenant_id, lead_id)
    }

    fn move_to(lead: &mut Lead, tenant_id: TenantId, lead_id: LeadId, status: LeadStatus) -> Result<Vec<LeadEvent>, DomainError> {
        execute(
            lead,
            &LeadCommand::ChangeLeadStatus(ChangeLeadStatus {
                tenant_id,
                lead_id,
                status,
                note: None,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn transition_table() {
        use LeadStatus::*;
        assert!(New.can_move_to(Contacted));
        assert!(!New.can_move_to(Negotiation));
        assert!(Contacted.can_move_to(Negotiation));
        assert!(Lost.can_move_to(Contacted));
        assert!(!Won.can_move_to(Lost));
        assert_eq!(LeadStatus::parse("Site Visit"), Some(SiteVisit));
    }

    #[test]
    fn lead_needs_phone_or_email() {
        let lead_id = LeadId::generate();
        let err = Lead::empty(lead_id)
            .handle(&LeadCommand::CaptureLead(CaptureLead {
                tenant_id: TenantId::new(),
                lead_id,
                name: "Anonymous".to_string(),
                phone: None,
                email: Some("  ".to_string()),
                source: None,
                interest: None,
                budget: None,
                status: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn conversion_requires_negotiation() {
        let (mut lead, tenant_id, lead_id) = captured();
        let convert = LeadCommand::ConvertLead(ConvertLead {
            tenant_id,
            lead_id,
            customer_id: CustomerId::generate(),
            occurred_at: Utc::now(),
        });
        assert!(lead.handle(&convert).is_err());

        move_to(&mut lead, tenant_id, lead_id, LeadStatus::Contacted).unwrap();
        assert!(move_to(&mut lead, tenant_id, lead_id, LeadStatus::Won).is_err());
        move_to(&mut lead, tenant_id, lead_id, LeadStatus::Negotiation).unwrap();

        execute(&mut lead, &convert).unwrap();
        assert_eq!(lead.status(), LeadStatus::Won);
        assert!(lead.customer_id().is_some());
        assert!(move_to(&mut lead, tenant_id, lead_id, LeadStatus::Lost).is_err());
    }
}
