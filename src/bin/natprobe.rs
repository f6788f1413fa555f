//! natprobe CLI
//!
//! Runs one NAT detection and prints the result.
//!
//! Usage: `natprobe [config.json]`

use anyhow::Context;
use natprobe::config::DetectorConfig;
use natprobe::nat::{detect_nat_with_config, DetectionResult, TraversalOutlook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    natprobe::init();

    let config = match std::env::args().nth(1) {
        Some(path) => DetectorConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => DetectorConfig::default(),
    };
    config.validate().context("Invalid configuration")?;

    println!("Detecting NAT type...");

    // Detection runs as one background unit of work
    let result = tokio::spawn(async move { detect_nat_with_config(&config).await })
        .await
        .context("Detection task failed")?;

    print_result(&result);

    if let Some(e) = &result.error {
        anyhow::bail!("NAT detection failed: {}", e);
    }
    Ok(())
}

fn print_result(result: &DetectionResult) {
    println!();
    println!("  NAT Type     {}", result.classification);
    println!("               {}", result.classification.description());

    if let Some(ip) = result.external_address {
        println!("  External IP  {}", ip);
    }

    println!(
        "  Mapping      {} {}",
        result.mapping,
        marker(result.mapping.outlook())
    );
    println!(
        "  Filtering    {} {}",
        result.filtering,
        marker(result.filtering.outlook())
    );

    if let Some(server) = &result.filtering_server {
        println!("               (via {})", server);
    }
}

fn marker(outlook: TraversalOutlook) -> &'static str {
    match outlook {
        TraversalOutlook::Favorable => "✓",
        TraversalOutlook::Caution => "⚠",
        TraversalOutlook::Unfavorable => "✗",
        TraversalOutlook::Undetermined => "?",
    }
}
