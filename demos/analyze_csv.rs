use pnl_irregularities::{
    read_csv_path, render_anomaly_table, write_anomalies_csv, write_cleaned_csv, AnalysisConfig,
    ChangeMode, DetectorOptions, PnlAnalyzer,
};
use anyhow::Context;
use std::io;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let csv_path = args
        .next()
        .unwrap_or_else(|| "demos/data/sample_pnl.csv".to_string());

    let base_config = match args.next() {
        Some(config_path) => {
            println!("⚙️  Loading configuration from {}", config_path);
            AnalysisConfig::from_path(&config_path)
                .with_context(|| format!("loading {}", config_path))?
        }
        None => AnalysisConfig::default(),
    };

    println!("📄 Reading {}\n", csv_path);
    let raw = read_csv_path(&csv_path).with_context(|| format!("reading {}", csv_path))?;

    let modes = [
        ChangeMode::ExplicitPercent,
        ChangeMode::PeriodOverPeriod,
        ChangeMode::Statistical,
    ];

    for mode in modes {
        let mut config = base_config.clone();
        if config.detector.mode != mode {
            config.detector = DetectorOptions {
                mode,
                ..DetectorOptions::default()
            };
        }

        println!("🔍 {} detection", mode);
        match PnlAnalyzer::analyze(&raw, &config) {
            Ok(report) => {
                println!("{}\n", report.summary());
                print!("{}", render_anomaly_table(&report.anomalies));
                println!();

                if mode == base_config.detector.mode {
                    println!("📊 Cleaned table:");
                    write_cleaned_csv(&report.cleaned, io::stdout())?;
                    println!();

                    if report.has_anomalies() {
                        println!("💾 Anomalies as CSV:");
                        write_anomalies_csv(&report.anomalies, io::stdout())?;
                        println!();
                    }

                    let stats = &report.stats;
                    println!(
                        "🧹 {} rows in, {} blank rows dropped, {} cells coerced, {} cells unparseable",
                        stats.rows_in,
                        stats.dropped_rows,
                        stats.total_coerced(),
                        stats.total_failed()
                    );
                    if !stats.dropped_columns.is_empty() {
                        println!("   Dropped columns: {}", stats.dropped_columns.join(", "));
                    }
                    println!();
                }
            }
            Err(e) => println!("❌ {}\n", e),
        }
    }

    Ok(())
}
