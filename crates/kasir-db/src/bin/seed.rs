//! # Subscription Plan Seeder
//!
//! Creates the default plans and their prices. Users cannot subscribe
//! until this has run once.
//!
//! ## Usage
//! ```bash
//! # Seed ./kasir_dev.db (default)
//! cargo run -p kasir-db --bin seed
//!
//! # Specify database path
//! cargo run -p kasir-db --bin seed -- --db ./data/kasir.db
//! ```
//!
//! ## Plans
//! | slug           | outlets | products | employees | monthly   |
//! |----------------|---------|----------|-----------|-----------|
//! | trial-7-days   | 1       | 50       | 2         | free      |
//! | basic          | 1       | 100      | 5         | 99.000    |
//! | professional   | 3       | 500      | 15        | 249.000   |
//! | enterprise     | ∞       | ∞        | ∞         | 499.000   |

use std::env;

use anyhow::Context;
use chrono::Utc;
use kasir_core::subscription::{DurationType, SubscriptionPlan, SubscriptionPlanPrice};
use kasir_core::{TRIAL_PLAN_SLUG, UNLIMITED};
use kasir_db::{generate_id, Database, DbConfig};

struct PlanSeed {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    limits: [i64; 4],
    /// reports, advanced, kitchen, tables, attendance, inventory, promo,
    /// stock transfer, self service, online, api, multi location
    flags: [bool; 12],
    features: &'static [&'static str],
    is_popular: bool,
    cta_text: Option<&'static str>,
    /// (duration, months, original price, discount %, final price)
    prices: &'static [(DurationType, i64, i64, i64, i64)],
}

const PLANS: &[PlanSeed] = &[
    PlanSeed {
        name: "Trial 7 Hari",
        slug: TRIAL_PLAN_SLUG,
        description: "Coba gratis selama 7 hari dengan akses penuh ke semua fitur Basic",
        limits: [1, 1, 50, 2],
        flags: [true, false, false, false, false, false, false, false, false, false, false, false],
        features: &[
            "Kelola transaksi penjualan",
            "Manajemen produk & stok",
            "Laporan penjualan dasar",
            "Support via email",
        ],
        is_popular: false,
        cta_text: None,
        prices: &[(DurationType::Monthly, 0, 0, 0, 0)],
    },
    PlanSeed {
        name: "Basic",
        slug: "basic",
        description: "Paket terbaik untuk bisnis kecil yang baru memulai",
        limits: [1, 1, 100, 5],
        flags: [true, false, false, false, true, false, false, false, false, false, false, false],
        features: &[
            "Kelola transaksi penjualan",
            "Manajemen produk & stok",
            "Laporan penjualan dasar",
            "Support via email",
            "Backup data otomatis",
        ],
        is_popular: false,
        cta_text: Some("Mulai Sekarang"),
        prices: &[
            (DurationType::Monthly, 1, 99_000, 0, 99_000),
            (DurationType::Quarterly, 3, 297_000, 10, 267_300),
            (DurationType::SemiAnnual, 6, 594_000, 15, 504_900),
            (DurationType::Annual, 12, 1_188_000, 20, 950_400),
        ],
    },
    PlanSeed {
        name: "Professional",
        slug: "professional",
        description: "Untuk bisnis yang sedang berkembang dengan beberapa outlet",
        limits: [3, 3, 500, 15],
        flags: [true, true, true, true, true, true, true, true, true, true, false, true],
        features: &[
            "Semua fitur Basic",
            "Multi lokasi (3 outlet)",
            "Integrasi online",
            "Laporan advanced",
            "Support prioritas via WA",
        ],
        is_popular: true,
        cta_text: Some("Paling Populer"),
        prices: &[
            (DurationType::Monthly, 1, 249_000, 0, 249_000),
            (DurationType::Quarterly, 3, 747_000, 10, 672_300),
            (DurationType::SemiAnnual, 6, 1_494_000, 15, 1_269_900),
            (DurationType::Annual, 12, 2_988_000, 25, 2_241_000),
        ],
    },
    PlanSeed {
        name: "Enterprise",
        slug: "enterprise",
        description: "Solusi lengkap untuk bisnis besar dengan banyak cabang",
        limits: [UNLIMITED, UNLIMITED, UNLIMITED, UNLIMITED],
        flags: [true; 12],
        features: &[
            "Semua fitur Professional",
            "Unlimited outlets",
            "Unlimited produk & karyawan",
            "API access",
            "Support 24/7",
        ],
        is_popular: false,
        cta_text: Some("Hubungi Kami"),
        prices: &[
            (DurationType::Monthly, 1, 499_000, 0, 499_000),
            (DurationType::Quarterly, 3, 1_497_000, 10, 1_347_300),
            (DurationType::SemiAnnual, 6, 2_994_000, 15, 2_544_900),
            (DurationType::Annual, 12, 5_988_000, 30, 4_191_600),
        ],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = env::var("DATABASE_URL").unwrap_or_else(|_| String::from("./kasir_dev.db"));

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasir subscription plan seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $DATABASE_URL or ./kasir_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kasir plan seeder");
    println!("Database: {}", db_path);

    let db = Database::new(DbConfig::from_url(&db_path))
        .await
        .with_context(|| format!("opening {}", db_path))?;

    let mut created = 0;
    for seed in PLANS {
        if db.subscriptions().get_plan_by_slug(seed.slug).await?.is_some() {
            println!("  = {} already exists, skipping", seed.slug);
            continue;
        }

        let plan = build_plan(seed);
        db.subscriptions()
            .insert_plan(&plan)
            .await
            .with_context(|| format!("inserting plan {}", seed.slug))?;

        for price in build_prices(&plan.id, seed) {
            db.subscriptions()
                .insert_price(&price)
                .await
                .with_context(|| format!("inserting {}-month price for {}", price.duration_months, seed.slug))?;
        }

        println!("  + {} ({} prices)", seed.slug, seed.prices.len());
        created += 1;
    }

    println!("Seed complete: {} plan(s) created", created);
    Ok(())
}

fn build_plan(seed: &PlanSeed) -> SubscriptionPlan {
    let now = Utc::now();
    let [max_businesses, max_outlets, max_products, max_employees] = seed.limits;
    let f = seed.flags;
    let sort_order = PLANS
        .iter()
        .position(|p| p.slug == seed.slug)
        .unwrap_or_default() as i64;

    SubscriptionPlan {
        id: generate_id(),
        name: seed.name.to_string(),
        slug: seed.slug.to_string(),
        description: Some(seed.description.to_string()),
        max_businesses,
        max_outlets,
        max_products,
        max_employees,
        has_reports_access: f[0],
        has_advanced_reports: f[1],
        has_kitchen_access: f[2],
        has_tables_access: f[3],
        has_attendance_access: f[4],
        has_inventory_access: f[5],
        has_promo_access: f[6],
        has_stock_transfer_access: f[7],
        has_self_service_access: f[8],
        has_online_integration: f[9],
        has_api_access: f[10],
        has_multi_location: f[11],
        features: serde_json::to_string(seed.features).unwrap_or_else(|_| "[]".to_string()),
        is_active: true,
        is_popular: seed.is_popular,
        cta_text: seed.cta_text.map(str::to_string),
        sort_order,
        created_at: now,
        updated_at: now,
    }
}

fn build_prices(plan_id: &str, seed: &PlanSeed) -> Vec<SubscriptionPlanPrice> {
    let now = Utc::now();
    seed.prices
        .iter()
        .map(|&(duration_type, months, original, discount, final_price)| SubscriptionPlanPrice {
            id: generate_id(),
            plan_id: plan_id.to_string(),
            duration_type,
            duration_months: months,
            original_price: original,
            final_price,
            discount_percentage: discount,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}
