use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};

use reload_backend::tokens::{Token, TokenCollection, TokenKind};

#[derive(Parser)]
#[command(name = "token-tool")]
#[command(about = "Inspect and sweep the persisted token file", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "tokenManager/tokens.json")]
    tokens: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every token with its expiry
    List,
    /// Remove expired tokens
    Prune {
        /// Report what would be removed without rewriting the file
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let now = Utc::now();
    let mut collection = TokenCollection::load(&cli.tokens)?;

    match cli.command {
        Commands::List => {
            for kind in TokenKind::ALL {
                let tokens = collection.get(kind);
                println!("{} ({})", kind.document_key(), tokens.len());
                for token in tokens {
                    print_token(token, now);
                }
            }
        }
        Commands::Prune { dry_run } => {
            let report = collection.prune(now);
            println!(
                "expired: {} access, {} refresh, {} client ({} total)",
                report.access,
                report.refresh,
                report.client,
                report.total()
            );
            if dry_run {
                println!("dry run, {} left untouched", cli.tokens.display());
            } else {
                collection.persist(&cli.tokens)?;
                println!("rewrote {}", cli.tokens.display());
            }
        }
    }

    Ok(())
}

fn print_token(token: &Token, now: chrono::DateTime<Utc>) {
    let value = token.bare_value();
    let short: String = value.chars().take(12).collect();
    match token.lifetime() {
        Ok(lifetime) => {
            let state = if lifetime.is_live_at(now) { "live" } else { "expired" };
            println!("  {}…  expires {}  {}", short, lifetime.expires_at().to_rfc3339(), state);
        }
        Err(e) => println!("  {}…  {}", short, e),
    }
}
