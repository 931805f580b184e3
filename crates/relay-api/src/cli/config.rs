//! `magnet-relay config`: show the effective configuration.

use anyhow::Result;
use console::style;

use relay_infra::config::{BOT_TOKEN_ENV, ResolvedConfig, TRANSMISSION_PASSWORD_ENV, process_env};

pub fn show_config(config: &ResolvedConfig, json: bool) -> Result<()> {
    let token_set = process_env(BOT_TOKEN_ENV).is_some();
    let password_set = process_env(TRANSMISSION_PASSWORD_ENV).is_some();

    if json {
        let mut value = serde_json::to_value(config)?;
        value["bot_token_set"] = token_set.into();
        value["transmission_password_set"] = password_set.into();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let settings = &config.settings;
    let timing = &settings.timing;
    let check_mark = |ok: bool| {
        if ok {
            format!("{}", style("✓").green())
        } else {
            format!("{}", style("✗").red())
        }
    };

    println!();
    println!(
        "  {} magnet-relay v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("  {}", style("── Paths ──").dim());
    println!("  Data:       {}", style(config.data_dir.display()).cyan());
    println!("  Downloads:  {}", style(config.download_dir.display()).cyan());
    println!("  Logs:       {}", style(config.log_dir.display()).cyan());
    println!();
    println!("  {}", style("── Limits ──").dim());
    println!("  Max upload:          {} bytes", settings.max_upload_bytes);
    println!("  Search depth:        {}", settings.search_depth);
    println!("  Resolution timeout:  {:?}", timing.resolution_timeout());
    println!("  Poll interval:       {:?}", timing.poll_interval());
    println!("  Progress interval:   {:?}", timing.progress_edit_interval());
    println!("  Upload delay:        {:?}", timing.upload_delay());
    println!();
    println!("  {}", style("── Services ──").dim());
    println!("  Telegram API:  {}", settings.telegram.api_base);
    println!("  Transmission:  {}", settings.transmission.rpc_url);
    println!("  {} {BOT_TOKEN_ENV} set", check_mark(token_set));
    if settings.transmission.username.is_some() {
        println!("  {} {TRANSMISSION_PASSWORD_ENV} set", check_mark(password_set));
    }
    println!();

    Ok(())
}
