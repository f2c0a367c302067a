//! Sample Data Generator
//!
//! Writes a synthetic patient CSV in the raw export layout the pipeline
//! accepts, with a configurable share of dirty rows.

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use tracing::info;

/// Column headers as they appear in raw hospital exports
const RAW_HEADERS: [&str; 18] = [
    "id",
    "Age",
    "Gender",
    "BMI",
    "Cholesterol",
    "Triglycerides",
    "CK-MB",
    "Troponin",
    "Diabetes",
    "Family History",
    "Smoking",
    "Obesity",
    "Alcohol Consumption",
    "Previous Heart Problems",
    "Medication Use",
    "Diet",
    "Stress Level",
    "Physical Activity Days Per Week",
];

#[derive(Parser, Debug)]
#[command(about = "Generate sample input for the heart risk pipeline")]
struct Args {
    /// Output CSV path
    #[arg(short, long, default_value = "data/sample.csv")]
    output: PathBuf,
    /// Number of patients
    #[arg(short, long, default_value_t = 100)]
    count: u64,
    /// Share of rows written with a missing or malformed cell
    #[arg(long, default_value_t = 0.05)]
    dirty_rate: f64,
}

/// Patient row generator
struct PatientGenerator {
    rng: rand::rngs::ThreadRng,
    patient_counter: u64,
}

impl PatientGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            patient_counter: 0,
        }
    }

    /// Generate one row of normalized measurements
    fn generate(&mut self) -> Vec<String> {
        self.patient_counter += 1;
        let binary = |rng: &mut rand::rngs::ThreadRng, p: f64| u8::from(rng.gen_bool(p)).to_string();

        vec![
            format!("P{:06}", self.patient_counter),
            self.unit(0.0..1.0),
            self.random_choice(&["Male", "Female"]).to_string(),
            self.unit(0.0..1.0),
            self.unit(0.0..1.0),
            self.unit(0.0..1.0),
            self.unit(0.0..0.15),
            self.unit(0.0..0.10),
            binary(&mut self.rng, 0.3),
            binary(&mut self.rng, 0.4),
            binary(&mut self.rng, 0.5),
            binary(&mut self.rng, 0.3),
            binary(&mut self.rng, 0.6),
            binary(&mut self.rng, 0.2),
            binary(&mut self.rng, 0.4),
            self.rng.gen_range(0..3).to_string(),
            self.rng.gen_range(1..=10).to_string(),
            self.rng.gen_range(0..=7).to_string(),
        ]
    }

    /// Blank or garble one measurement so the row is dropped during cleaning
    fn corrupt(&mut self, row: &mut [String]) {
        let column = self.rng.gen_range(1..row.len());
        row[column] = if self.rng.gen_bool(0.5) {
            String::new()
        } else {
            "n/a".to_string()
        };
    }

    fn unit(&mut self, range: std::ops::Range<f64>) -> String {
        format!("{:.4}", self.rng.gen_range(range))
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_sample=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        output = %args.output.display(),
        count = args.count,
        dirty_rate = args.dirty_rate,
        "Generating sample data"
    );

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    writer.write_record(RAW_HEADERS)?;

    let mut generator = PatientGenerator::new();
    let mut rng = rand::thread_rng();
    let mut dirty_count = 0;

    for _ in 0..args.count {
        let mut row = generator.generate();
        if rng.gen_bool(args.dirty_rate.clamp(0.0, 1.0)) {
            generator.corrupt(&mut row);
            dirty_count += 1;
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} patients ({} with a dirty cell)",
        args.count, dirty_count
    );

    Ok(())
}
