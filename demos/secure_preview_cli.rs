use clap::{Arg, Command};
use colored::Colorize;
use link_guard::unguarded;
use link_guard::{
    log_denial_card, log_preview_card, setup_logging, GuardConfig, LogConfig, PreviewResult,
    PreviewService,
};
use std::error::Error;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("Guarded Link Preview CLI")
        .version("0.1")
        .about("Generate link previews behind an SSRF guard")
        .arg(
            Arg::new("urls")
                .help("URLs to preview")
                .required(true)
                .num_args(1..),
        )
        .arg(
            Arg::new("https-only")
                .long("https-only")
                .help("Only allow HTTPS URLs")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .help("Per-request timeout in seconds (default: 5)")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("unguarded")
                .long("unguarded")
                .help("Skip every check and echo raw JSON (DEMONSTRATION ONLY)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    setup_logging(LogConfig {
        log_level: "warn".into(),
        ..Default::default()
    })?;

    let mut config = GuardConfig::from_env()?;
    if matches.get_flag("https-only") {
        config = config.https_only();
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config = config.with_fetch_timeout(Duration::from_secs(*secs));
    }

    let urls: Vec<&str> = matches
        .get_many::<String>("urls")
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default();
    let as_json = matches.get_flag("json");

    if matches.get_flag("unguarded") {
        println!("{}", "UNGUARDED MODE: no SSRF protection".red().bold());
        for url in urls {
            match unguarded::fetch_preview(url, &config).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => println!("{} {}: {}", "✗".red(), url, e),
            }
        }
        return Ok(());
    }

    println!("{}", "Guarded Link Preview".bold().green());
    println!("{}", "====================".green());

    let service = PreviewService::new(config)?;
    for (url, result) in service.generate_previews(&urls).await {
        match result {
            Ok(preview) => {
                log_preview_card(&preview);
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&preview)?);
                } else {
                    print_preview(&preview);
                }
            }
            Err(e) => {
                log_denial_card(&url, &e);
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&e.to_body())?);
                } else {
                    println!(
                        "{} {} [{}] {}",
                        "✗".red(),
                        url,
                        e.status_class().to_string().yellow(),
                        e.user_message()
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_preview(preview: &PreviewResult) {
    println!("{} {}", "✓".green(), preview.url.bold());
    println!("  {}: {}", "Title".cyan(), preview.title);
    println!("  {}: {}", "Description".cyan(), preview.description);
    println!("  {}: {}", "Image".cyan(), preview.image_url);
    println!("  {}: {}", "Site".cyan(), preview.site_name);
    if let Some(video) = &preview.video {
        println!("  {}: {}", "Embed".cyan(), video.embed_url);
    }
}
