use anyhow::Result;
use colored::Colorize;
use gex_analyzer::api_server::{self, build_chain_source};
use gex_analyzer::config::{self, Credentials, GexConfig};
use gex_analyzer::fetcher;
use gex_analyzer::gex::{calculate_gex, filter_strikes_around_atm, format_gex_value};
use gex_analyzer::logging;
use gex_analyzer::schwab_client::SchwabClient;

/// Run API server mode
async fn run_server(cfg: GexConfig) -> Result<()> {
    println!("{}", "=".repeat(60).blue());
    println!("{}", "GEX API Server".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!();

    api_server::start_server(config::get_server_port(), cfg).await
}

/// One-shot fetch + strike-ladder print
async fn run_snapshot(cfg: GexConfig) -> Result<()> {
    println!("{}", "=".repeat(60).blue());
    println!("{}", "GEX Snapshot".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!();

    let source = build_chain_source(&cfg).await?;
    println!("{} Data source: {}", "ℹ".blue(), source.label().yellow());
    println!("{} Fetching {} options chain...", "→".cyan(), config::DISPLAY_SYMBOL.yellow());

    let (records, spot_price) = source.fetch(&cfg).await?;
    println!(
        "{} {} contract rows | spot {:.2}",
        "✓".green(),
        records.len(),
        spot_price
    );
    println!();

    let filtered = filter_strikes_around_atm(&records, spot_price, &cfg);
    let result = calculate_gex(&filtered, spot_price, &cfg);

    if result.surface.rows.is_empty() {
        println!("{} No GEX data to display", "⚠".yellow());
        return Ok(());
    }

    // Header: strike, one column per displayed expiration, aggregate, net OI
    let mut header = format!("{:>8}", "Strike");
    for exp in &result.surface.expiry_columns {
        header.push_str(&format!("{:>10}", exp.format("%m/%d").to_string()));
    }
    header.push_str(&format!("{:>12}", result.surface.aggregate_label));
    header.push_str(&format!("{:>10}", "Net OI"));
    println!("{}", header.bold());

    let atm_strike = (spot_price / cfg.strike_increment).round() * cfg.strike_increment;

    for row in &result.surface.rows {
        let strike_cell = format!("{:>8.0}", row.strike);
        let mut line = if row.strike == atm_strike {
            strike_cell.cyan().bold().to_string()
        } else {
            strike_cell.normal().to_string()
        };
        for val in &row.by_expiry {
            line.push_str(&colorize_gex(*val, 10));
        }
        line.push_str(&colorize_gex(row.aggregate, 12));
        line.push_str(&format!("{:>10}", format_gex_value(row.net_contracts)));
        println!("{}", line);
    }

    println!();
    if let Some(magnet) = result
        .gex_by_strike
        .iter()
        .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
    {
        println!(
            "{} Largest positive GEX (magnet): {} at strike {:.0}",
            "ℹ".blue(),
            format_gex_value(magnet.value).green(),
            magnet.strike
        );
    }
    if let Some(accelerant) = result
        .gex_by_strike
        .iter()
        .min_by(|a, b| a.value.partial_cmp(&b.value).unwrap())
    {
        if accelerant.value < 0.0 {
            println!(
                "{} Largest negative GEX (accelerant): {} at strike {:.0}",
                "ℹ".blue(),
                format_gex_value(accelerant.value).red(),
                accelerant.strike
            );
        }
    }
    println!("{}", "=".repeat(60).blue());

    Ok(())
}

fn colorize_gex(val: f64, width: usize) -> String {
    let cell = format!("{:>width$}", format_gex_value(val), width = width);
    if val > 0.0 {
        cell.green().to_string()
    } else if val < 0.0 {
        cell.red().to_string()
    } else {
        cell
    }
}

/// Auth smoke check: renew a token and print the spot quote
async fn run_quote(cfg: GexConfig) -> Result<()> {
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Schwab Auth Check".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!();

    let credentials = Credentials::from_env()?;
    println!("{} Credentials loaded, requesting token...", "→".cyan());
    let client = SchwabClient::new(&credentials).await?;
    println!("{} Token acquired", "✓".green());

    let spot_price = fetcher::get_spot_price(&client, &cfg).await?;
    println!(
        "{} {} last price: {}",
        "✓".green(),
        config::DISPLAY_SYMBOL.yellow(),
        format!("{:.2}", spot_price).bold()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let cfg = GexConfig::from_env();
    let mode = config::get_execution_mode();

    match mode.as_str() {
        "server" => run_server(cfg).await?,
        "snapshot" => run_snapshot(cfg).await?,
        "quote" => run_quote(cfg).await?,
        _ => {
            eprintln!("Invalid mode '{}'. Use 'server', 'snapshot', or 'quote'", mode);
            eprintln!("Set GEX_MODE environment variable to control execution mode");
            eprintln!("Examples:");
            eprintln!("  GEX_MODE=server GEX_PORT=3001 cargo run        # Start API server");
            eprintln!("  GEX_MODE=snapshot cargo run                    # One-shot GEX ladder");
            eprintln!("  GEX_MODE=snapshot DATA_SOURCE=schwab cargo run # Snapshot from Schwab");
            eprintln!("  GEX_MODE=quote DATA_SOURCE=schwab cargo run    # Auth smoke check");
            std::process::exit(1);
        }
    }

    Ok(())
}
