//! Criterion benchmarks for MarginLab hot paths.
//!
//! Benchmarks:
//! 1. Ledger ordered insert and extreme removal
//! 2. Account batch operations (full open, rebalance, losscut)
//! 3. Trailing-window indicators
//! 4. Full daily simulation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use marginlab_core::data::DayPrices;
use marginlab_core::domain::{Account, DailyBar, Position, PositionId, PositionLedger, RiskParameter};
use marginlab_core::engine::{run_simulation, SimulationConfig};
use marginlab_core::indicators::TrailingWindow;
use marginlab_core::strategy::{LeverageRatioStrategy, LosscutValueStrategy};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_days(n: usize) -> Vec<DayPrices> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    (0..n)
        .map(|i| {
            let date = base_date + chrono::Duration::days(i as i64);
            let close = 3000.0 + (i as f64 * 0.1).sin() * 150.0 + i as f64 * 0.5;
            let open = close - 3.0;
            let vol = 20.0 + (i as f64 * 0.07).cos() * 6.0;
            DayPrices {
                date,
                index: DailyBar::new(date, open, close + 15.0, open - 20.0, close),
                volatility: DailyBar::new(date, vol, vol + 1.0, vol - 1.0, vol),
            }
        })
        .collect()
}

/// Entry prices scattered so inserts land mid-ledger.
fn scattered_price(i: u64) -> f64 {
    1000.0 + ((i * 7919) % 1000) as f64
}

fn stocked_account(units: usize) -> Account {
    let mut account = Account::new();
    account.deposit(units as f64 * 100.0);
    account.full_open(1000.0, RiskParameter::StopLoss(900.0)).unwrap();
    account
}

// ── 1. Ledger ────────────────────────────────────────────────────────

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    for &size in &[100u64, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("ordered_insert", size), &size, |b, &size| {
            b.iter(|| {
                let mut ledger = PositionLedger::new();
                for i in 0..size {
                    let entry = scattered_price(i);
                    ledger.add(Position::with_losscut_value(PositionId(i), entry, entry - 50.0).unwrap());
                }
                black_box(&ledger);
            });
        });

        group.bench_with_input(BenchmarkId::new("drain_alternating", size), &size, |b, &size| {
            let mut ledger = PositionLedger::new();
            for i in 0..size {
                let entry = scattered_price(i);
                ledger.add(Position::with_losscut_value(PositionId(i), entry, entry - 50.0).unwrap());
            }
            b.iter(|| {
                let mut ledger = ledger.clone();
                while ledger.remove_max().is_some() {
                    ledger.remove_min();
                }
                black_box(&ledger);
            });
        });
    }

    group.finish();
}

// ── 2. Account Batch Operations ──────────────────────────────────────

fn bench_account(c: &mut Criterion) {
    let mut group = c.benchmark_group("account");

    group.bench_function("full_open_1000_units", |b| {
        b.iter(|| black_box(stocked_account(1000)));
    });

    let account = stocked_account(1000);

    group.bench_function("set_losscut_value_with_close_1000", |b| {
        b.iter(|| {
            let mut account = account.clone();
            account.set_losscut_value_with_close(black_box(990.0), 850.0).unwrap();
            black_box(account);
        });
    });

    group.bench_function("set_leverage_with_close2_1000", |b| {
        b.iter(|| {
            let mut account = account.clone();
            account.set_leverage_with_close2(black_box(990.0), 5.0).unwrap();
            black_box(account);
        });
    });

    group.bench_function("exec_losscut_1000", |b| {
        b.iter(|| {
            let mut account = account.clone();
            black_box(account.exec_losscut(black_box(850.0)));
        });
    });

    group.finish();
}

// ── 3. Trailing Window ───────────────────────────────────────────────

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("trailing_window");

    for &capacity in &[20usize, 40, 200] {
        let mut window = TrailingWindow::new(capacity);
        for i in 0..capacity {
            window.push(20.0 + (i as f64 * 0.3).sin() * 5.0);
        }
        group.bench_with_input(BenchmarkId::new("rci", capacity), &capacity, |b, _| {
            b.iter(|| black_box(window.rci()));
        });
        group.bench_with_input(BenchmarkId::new("push_average_rsi", capacity), &capacity, |b, _| {
            let mut window = window.clone();
            b.iter(|| {
                window.push(black_box(21.0));
                black_box((window.average(), window.rsi()));
            });
        });
    }

    group.finish();
}

// ── 4. Full Simulation ───────────────────────────────────────────────

fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");

    for &day_count in &[252usize, 2520] {
        let days = make_days(day_count);
        let config = SimulationConfig::default();

        group.bench_with_input(BenchmarkId::new("losscut_value", day_count), &day_count, |b, _| {
            b.iter(|| {
                let mut strategy = LosscutValueStrategy::default();
                run_simulation(black_box(&config), &mut strategy, black_box(&days)).unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("leverage_ratio", day_count), &day_count, |b, _| {
            b.iter(|| {
                let mut strategy = LeverageRatioStrategy::default();
                run_simulation(black_box(&config), &mut strategy, black_box(&days)).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ledger, bench_account, bench_window, bench_simulation);
criterion_main!(benches);
