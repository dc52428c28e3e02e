use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use estateerp_accounting::{CreateVoucher, Voucher, VoucherCommand, VoucherEntry, VoucherId, VoucherKind};
use estateerp_core::TenantId;
use estateerp_events::{EventEnvelope, InMemoryEventBus};
use estateerp_infra::command_dispatcher::CommandDispatcher;
use estateerp_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use estateerp_infra::numbering::NumberSeries;
use estateerp_infra::projections::ReadModels;
use estateerp_infra::streams;
use estateerp_inventory::{
    CreateItem, InventoryCommand, InventoryItem, InventoryItemId, MovementDirection, RecordMovement,
};
use estateerp_invoicing::{InvoiceItem, SupplyKind, compute_lines};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;

fn dispatcher() -> Dispatcher {
    CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()))
}

fn create_item(d: &Dispatcher, tenant_id: TenantId) -> InventoryItemId {
    let item_id = InventoryItemId::generate();
    d.dispatch::<InventoryItem>(
        tenant_id,
        item_id.0,
        streams::INVENTORY_ITEM,
        InventoryCommand::CreateItem(CreateItem {
            tenant_id,
            item_id,
            sku: "CEM-53".to_string(),
            name: "Cement OPC 53".to_string(),
            unit: "bag".to_string(),
            hsn: Some("2523".to_string()),
            gst_rate: 2800,
            reorder_level: 50,
            occurred_at: Utc::now(),
        }),
        |_, id| InventoryItem::empty(InventoryItemId::new(id)),
    )
    .unwrap();
    item_id
}

fn receive(d: &Dispatcher, tenant_id: TenantId, item_id: InventoryItemId, batch: usize) {
    d.dispatch::<InventoryItem>(
        tenant_id,
        item_id.0,
        streams::INVENTORY_ITEM,
        InventoryCommand::RecordMovement(RecordMovement {
            tenant_id,
            item_id,
            direction: MovementDirection::In,
            warehouse: "SITE-A".to_string(),
            batch: Some(format!("B{}", batch % 8)),
            quantity: 10,
            reference: None,
            reason: None,
            occurred_at: Utc::now(),
        }),
        |_, id| InventoryItem::empty(InventoryItemId::new(id)),
    )
    .unwrap();
}

fn post_voucher(d: &Dispatcher, tenant_id: TenantId, n: usize) {
    let voucher_id = VoucherId::generate();
    d.dispatch::<Voucher>(
        tenant_id,
        voucher_id.0,
        streams::VOUCHER,
        VoucherCommand::CreateVoucher(CreateVoucher {
            tenant_id,
            voucher_id,
            number: format!("JV-{n:06}"),
            kind: VoucherKind::Journal,
            date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            narration: "bench".to_string(),
            entries: vec![VoucherEntry::debit("1001", 1_000), VoucherEntry::credit("4001", 1_000)],
            reference: None,
            post: true,
            occurred_at: Utc::now(),
        }),
        |_, id| Voucher::empty(VoucherId::new(id)),
    )
    .unwrap();
}

/// Dispatch cost grows with the stream it rehydrates.
fn bench_dispatch_against_stream_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_stock_movement");
    for history in [0usize, 100, 1_000] {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let item_id = create_item(&d, tenant_id);
        for i in 0..history {
            receive(&d, tenant_id, item_id, i);
        }
        let mut next = history;
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, _| {
            b.iter(|| {
                next += 1;
                receive(&d, tenant_id, item_id, black_box(next));
            })
        });
    }
    group.finish();
}

fn bench_read_model_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_read_models");
    for vouchers in [100usize, 1_000] {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        for n in 0..vouchers {
            post_voucher(&d, tenant_id, n);
        }
        let history: Vec<StoredEvent> = d.store().load_all().unwrap();

        group.throughput(Throughput::Elements(history.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(vouchers), &history, |b, history| {
            b.iter(|| {
                let models = ReadModels::new(Arc::new(NumberSeries::new()));
                models.rebuild(black_box(history));
                models
            })
        });
    }
    group.finish();
}

fn bench_gst_lines(c: &mut Criterion) {
    let items: Vec<InvoiceItem> = (0..50)
        .map(|i| InvoiceItem {
            description: format!("Item {i}"),
            hsn_sac: "995411".to_string(),
            quantity: 1 + i as u64,
            unit_price: 12_345 + i as i64,
            discount: 0,
            gst_rate: 1800,
        })
        .collect();

    c.bench_function("gst_compute_50_lines_intra_state", |b| {
        b.iter(|| compute_lines(black_box(&items), SupplyKind::IntraState).unwrap())
    });
}

criterion_group!(
    benches,
    bench_dispatch_against_stream_length,
    bench_read_model_rebuild,
    bench_gst_lines
);
criterion_main!(benches);
