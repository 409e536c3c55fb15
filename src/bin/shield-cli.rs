use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use request_shield::config::{load_config, ConfigError};
use request_shield::security::{derive_request_key, escape_html, sanitize, sanitize_html_content};
use request_shield::security::sanitize::sanitize_str;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Operator CLI for request-shield", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send requests and print the rate-limit headers of each response
    Probe {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        #[arg(short, long, default_value = "/api/whoami")]
        path: String,

        /// Bearer token sent with every request
        #[arg(short, long)]
        token: Option<String>,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Print the identity key a request would be counted under
    DeriveKey {
        #[arg(short, long)]
        token: Option<String>,

        /// Extra request header, `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Socket peer address
        #[arg(long)]
        peer: Option<SocketAddr>,
    },
    /// Sanitize a JSON document or plain string
    Sanitize {
        input: String,

        /// Treat the input as HTML content
        #[arg(long)]
        html: bool,

        /// With --html, keep basic formatting tags
        #[arg(long, requires = "html")]
        allow_basic_tags: bool,

        /// HTML-escape the result
        #[arg(long)]
        escape: bool,
    },
    /// Validate a config file
    CheckConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Probe { url, path, token, count } => {
            let client = reqwest::Client::new();
            for i in 1..=count {
                let mut req = client.get(format!("{}{}", url.trim_end_matches('/'), path));
                if let Some(token) = &token {
                    req = req.header(AUTHORIZATION, format!("Bearer {}", token));
                }
                print_probe(i, req.send().await?);
            }
        }
        Commands::DeriveKey { token, headers, peer } => {
            let mut map = HeaderMap::new();
            if let Some(token) = token {
                map.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
            }
            for raw in headers {
                let (name, value) = raw
                    .split_once(':')
                    .ok_or_else(|| format!("invalid header '{}', expected 'name: value'", raw))?;
                map.append(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }
            println!("{}", derive_request_key(&map, peer));
        }
        Commands::Sanitize { input, html, allow_basic_tags, escape } => {
            let cleaned = if html {
                sanitize_html_content(&input, allow_basic_tags)
            } else {
                match serde_json::from_str::<Value>(&input) {
                    Ok(value) => serde_json::to_string_pretty(&sanitize(value))?,
                    Err(_) => sanitize_str(&input),
                }
            };
            if escape {
                println!("{}", escape_html(&cleaned));
            } else {
                println!("{}", cleaned);
            }
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!(
                    "{}: ok ({} route policies, {} req / {} ms default limit)",
                    path.display(),
                    config.routes.len(),
                    config.gate.rate_limit.max_requests,
                    config.gate.rate_limit.window_ms
                );
            }
            Err(ConfigError::Validation(errors)) => {
                eprintln!("{}: {} problem(s)", path.display(), errors.len());
                for error in errors {
                    eprintln!("  - {}", error);
                }
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn print_probe(attempt: u32, res: reqwest::Response) {
    let header = |name: &str| {
        res.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    println!(
        "#{:<4} {}  limit={} remaining={} reset={} retry-after={}",
        attempt,
        res.status(),
        header("x-ratelimit-limit"),
        header("x-ratelimit-remaining"),
        header("x-ratelimit-reset"),
        header("retry-after"),
    );
}
