//! Larder CLI - a command-line cart client.
//!
//! # Usage
//!
//! ```bash
//! # Add a product as a guest (kept in the local cache)
//! larder add --id p1 --title "Dried Mango" --price 4.50
//!
//! # Sign in; the guest cart is merged into the user's remote cart
//! larder login --user u1
//!
//! # Show the cart with totals
//! larder show
//!
//! # Walk through checkout and empty the cart
//! larder checkout
//! ```
//!
//! # Environment Variables
//!
//! - `CART_API_URL` - Base URL of the remote cart store (required)
//! - `CART_API_TOKEN` - Bearer token for the remote cart store
//! - `LARDER_CACHE_DIR` - Local cache directory (default `.larder`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "larder")]
#[command(author, version, about = "Larder cart client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cart and its totals
    Show,
    /// Add one unit of a product
    Add {
        /// Product ID
        #[arg(long)]
        id: String,

        /// Product title
        #[arg(long)]
        title: String,

        /// Unit price, e.g. 4.50
        #[arg(long)]
        price: String,

        /// Product image URL
        #[arg(long, default_value = "")]
        image: String,
    },
    /// Remove a product line entirely
    Remove {
        /// Product ID
        #[arg(long)]
        id: String,
    },
    /// Empty the cart
    Clear,
    /// Sign in and merge the guest cart into the user's cart
    Login {
        /// User ID
        #[arg(short, long)]
        user: String,
    },
    /// Sign out and return to the guest cart
    Logout,
    /// Walk through checkout and place the order
    Checkout,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = Context::open()?;

    match cli.command {
        Commands::Show => commands::cart::show(&ctx).await,
        Commands::Add {
            id,
            title,
            price,
            image,
        } => commands::cart::add(&ctx, &id, &title, &price, &image).await?,
        Commands::Remove { id } => commands::cart::remove(&ctx, &id).await?,
        Commands::Clear => commands::cart::clear(&ctx).await,
        Commands::Login { user } => commands::session::login(&ctx, &user).await?,
        Commands::Logout => commands::session::logout(&ctx).await?,
        Commands::Checkout => commands::checkout::run(&ctx).await?,
    }

    ctx.print_notifications();
    Ok(())
}
