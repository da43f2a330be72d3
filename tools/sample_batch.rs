//! Sample Batch Generator
//!
//! Writes a synthetic CSV batch of transactions for smoke-testing a
//! deployment. The file is written under a temporary name and renamed, so
//! a watcher on the target directory sees one complete file.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fraud_scoring_service::types::TransactionRecord;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const CATEGORIES: [&str; 6] = [
    "grocery_pos",
    "gas_transport",
    "home",
    "shopping_net",
    "misc_net",
    "travel",
];
const STATES: [&str; 6] = ["NY", "CA", "TX", "FL", "PA", "IL"];

/// Random transaction generator
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    base_time: NaiveDateTime,
    counter: u64,
}

impl TransactionGenerator {
    fn new() -> Self {
        let base_time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            rng: rand::thread_rng(),
            base_time,
            counter: 0,
        }
    }

    fn base_record(&mut self) -> TransactionRecord {
        self.counter += 1;
        let lat = self.rng.gen_range(25.0..48.0);
        let lon = self.rng.gen_range(-123.0..-70.0);

        TransactionRecord {
            transaction_time: String::new(),
            amount: None,
            lat: Some(lat),
            lon: Some(lon),
            merchant_lat: None,
            merchant_lon: None,
            population_city: Some(self.rng.gen_range(500.0..2_500_000.0_f64).round()),
            cat_id: Some(self.random_choice(&CATEGORIES).to_string()),
            us_state: Some(self.random_choice(&STATES).to_string()),
            gender: Some(self.random_choice(&["F", "M"]).to_string()),
            name_1: Some(format!("first_{}", self.counter)),
            name_2: Some(format!("last_{}", self.counter)),
            street: Some(format!("{} Main St", self.rng.gen_range(1..9999))),
            one_city: Some("Springfield".to_string()),
            jobs: Some("Engineer".to_string()),
            merch: Some(format!("merchant_{}", self.rng.gen_range(1..1000))),
            post_code: Some(format!("{:05}", self.rng.gen_range(10000..99999))),
            target: None,
        }
    }

    fn timestamp(&mut self, hours: std::ops::Range<i64>) -> String {
        let offset = Duration::days(self.rng.gen_range(0..30))
            + Duration::hours(self.rng.gen_range(hours))
            + Duration::minutes(self.rng.gen_range(0..60));
        (self.base_time + offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Ordinary purchase close to home during the day
    fn generate_legitimate(&mut self) -> TransactionRecord {
        let mut record = self.base_record();
        record.transaction_time = self.timestamp(8..22);
        record.amount = Some((self.rng.gen_range(5.0..200.0_f64) * 100.0).round() / 100.0);
        record.merchant_lat = record.lat.map(|v| v + self.rng.gen_range(-0.5..0.5));
        record.merchant_lon = record.lon.map(|v| v + self.rng.gen_range(-0.5..0.5));
        record.target = Some("0".to_string());
        record
    }

    /// Large online purchase, at night, far from home
    fn generate_suspicious(&mut self) -> TransactionRecord {
        let mut record = self.base_record();
        record.transaction_time = self.timestamp(0..5);
        record.amount = Some((self.rng.gen_range(500.0..3000.0_f64) * 100.0).round() / 100.0);
        record.merchant_lat = Some(self.rng.gen_range(25.0..48.0));
        record.merchant_lon = Some(self.rng.gen_range(-123.0..-70.0));
        record.cat_id = Some(self.random_choice(&["shopping_net", "misc_net"]).to_string());
        record.target = Some("1".to_string());
        record
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_batch=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let output = PathBuf::from(args.get(1).map(|s| s.as_str()).unwrap_or("input/sample.csv"));
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.1);

    info!(
        output = %output.display(),
        count = count,
        fraud_rate = fraud_rate,
        "Generating sample batch"
    );

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();
    let mut suspicious_count = 0;

    let staging = output.with_extension("csv.tmp");
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let mut writer = csv::Writer::from_path(&staging)?;
        for _ in 0..count {
            let record = if rng.gen_bool(fraud_rate.clamp(0.0, 1.0)) {
                suspicious_count += 1;
                generator.generate_suspicious()
            } else {
                generator.generate_legitimate()
            };
            writer.serialize(&record)?;
        }
        writer.flush()?;
    }
    fs::rename(&staging, &output)?;

    info!(
        "Completed! Wrote {} transactions ({} legitimate, {} suspicious) to {}",
        count,
        count - suspicious_count,
        suspicious_count,
        output.display()
    );

    Ok(())
}
