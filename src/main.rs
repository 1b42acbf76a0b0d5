//! Pickup CLI - client for the recycling pickup scheduling service
//!
//! Sign in with a one-time code, schedule material pickups and browse
//! order history from the terminal.

mod api;
mod auth;
mod config;
mod models;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use models::{DeliveryAddress, MaterialSelection};

#[derive(Parser)]
#[command(name = "pickup-cli")]
#[command(about = "Schedule recycling pickups from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a one-time login code to a mobile number
    SendOtp {
        /// 10-digit mobile number
        #[arg(short, long)]
        phone: String,
    },

    /// Sign in with the code received by SMS
    Login {
        /// 10-digit mobile number
        #[arg(short, long)]
        phone: String,

        /// One-time code
        #[arg(short, long)]
        otp: String,

        /// Display name, required the first time a number signs in
        #[arg(short, long)]
        name: Option<String>,

        /// Device push token to attach to the account
        #[arg(long)]
        push_token: Option<String>,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show current user info (verify auth works)
    Whoami,

    /// Change your display name
    Rename {
        /// New display name
        name: String,
    },

    /// Attach a device push token to your account
    RegisterDevice {
        /// Push token issued by the notification service
        token: String,
    },

    /// List the materials that can be picked up
    Materials,

    /// Upload a photo and print its hosted URL
    Upload {
        /// Image file
        path: PathBuf,
    },

    /// Schedule a pickup
    Order {
        /// House number and street
        #[arg(long)]
        street: String,

        #[arg(long)]
        city: String,

        #[arg(long)]
        state: String,

        #[arg(long)]
        pincode: String,

        /// Material to pick up (repeatable), e.g. --material Plastic
        #[arg(short, long = "material", required = true)]
        materials: Vec<String>,

        /// Sub-option of a selected material (repeatable), e.g. --sub Bottles
        #[arg(short, long = "sub")]
        sub_options: Vec<String>,

        /// Name to use instead of "Others"
        #[arg(long)]
        other: Option<String>,

        /// Photo of the materials
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// List past orders
    History {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Orders per page
        #[arg(short, long, default_value = "10")]
        size: u32,
    },
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::SendOtp { phone } => {
            auth::request_otp(&phone).await?;
        }
        Commands::Login {
            phone,
            otp,
            name,
            push_token,
        } => {
            tracing::info!("Verifying OTP...");
            auth::login(&phone, &otp, name.as_deref(), push_token.as_deref()).await?;
        }
        Commands::Logout => {
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Rename { name } => {
            api::rename(&name).await?;
        }
        Commands::RegisterDevice { token } => {
            api::register_device(&token).await?;
        }
        Commands::Materials => {
            api::list_materials();
        }
        Commands::Upload { path } => {
            api::upload(&path).await?;
        }
        Commands::Order {
            street,
            city,
            state,
            pincode,
            materials,
            sub_options,
            other,
            image,
        } => {
            let address = DeliveryAddress {
                street,
                city,
                state,
                pincode,
            };
            let selection = MaterialSelection {
                materials,
                sub_options,
                custom_material: other,
            };
            api::place_order(address, selection, image.as_deref()).await?;
        }
        Commands::History { page, size } => {
            tracing::info!("Fetching order history...");
            api::history(page, size).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let result = run(cli.command).await;
    if let Err(ref e) = result {
        if e.downcast_ref::<api::ApiError>().is_some_and(api::ApiError::needs_login) {
            tracing::warn!("Session is no longer valid");
        }
    }
    result
}
