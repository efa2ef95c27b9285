use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use stockbook_api::{InventoryService, ServiceSettings};
use stockbook_catalog::NewProduct;
use stockbook_core::{Actor, ManualClock, Money, ProductCode, TimeRange, UserId};
use stockbook_infra::MemoryStore;
use stockbook_ledger::{Movement, Reason};
use stockbook_reporting::{Interval, TrendMetric, TrendQuery};

const CATEGORIES: [&str; 5] = ["Bolts", "Nuts", "Tools", "Garden", "Paint"];

fn populated(products: usize, movements_per_product: usize) -> (InventoryService<MemoryStore>, Actor) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let svc = InventoryService::with_settings(MemoryStore::new(), ServiceSettings::default(), clock.clone());
    let me = Actor::new(UserId::new(), "bench");

    for p in 0..products {
        let code = ProductCode::new(format!("SKU-{p:05}")).unwrap();
        svc.add_product(
            Some(&me),
            NewProduct {
                code: code.clone(),
                name: format!("Item {p}"),
                price: Money::from_minor(100 + (p as i64 % 900)),
                category: Some(CATEGORIES[p % CATEGORIES.len()].to_string()),
            },
            50,
        )
        .unwrap();

        for m in 0..movements_per_product {
            clock.advance(Duration::minutes(17));
            let movement = if m % 3 == 0 {
                Movement::new(code.clone(), 4, Reason::Receipt)
            } else {
                Movement::new(code.clone(), -1, Reason::Sale)
            };
            svc.record_movement(Some(&me), movement).unwrap();
        }
    }

    (svc, me)
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for products in [100usize, 1_000].iter() {
        let (svc, me) = populated(*products, 5);
        group.bench_with_input(BenchmarkId::new("products", products), products, |b, _| {
            b.iter(|| black_box(svc.snapshot(Some(&me), None).unwrap()))
        });
    }

    group.finish();
}

fn bench_trend(c: &mut Criterion) {
    let mut group = c.benchmark_group("trend");
    let (svc, me) = populated(200, 20);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let range = TimeRange::new(start, start + Duration::days(60)).unwrap();

    for interval in [Interval::Hour, Interval::Day, Interval::Week] {
        let query = TrendQuery::new(TrendMetric::Value, interval, range);
        group.bench_function(interval.as_str(), |b| {
            b.iter(|| black_box(svc.trend(Some(&me), &query).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_snapshot, bench_trend);
criterion_main!(benches);
