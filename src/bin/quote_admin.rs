//! Operator CLI: migrations, demo catalog, offline part-number checks and
//! development tokens.
//!
//! Run with: cargo run --bin quote-admin -- --help

use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use quote_workflow_api::{
    auth::{AuthConfig, AuthService, AuthUser, Role},
    bom::part_number::{
        assemble_part_number, ChassisSpec, PartNumberOptions, SlotCard, TemplateValues,
    },
    config::{self, AppConfig},
    db,
    entities::product::Entity as Product,
    events::{self, EventSender},
    services::catalog::{CatalogService, CreateProductInput, ProductLevel, MAX_SLOT_COUNT},
};

#[derive(Parser)]
#[command(name = "quote-admin", about = "Administration tasks for the quote workflow API", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Insert a small demonstration catalog (skipped when products exist)
    SeedCatalog,
    /// Assemble a chassis part number without touching the database
    PreviewPartNumber(PreviewArgs),
    /// Mint a bearer token for local testing
    IssueToken(IssueTokenArgs),
}

#[derive(Args)]
struct PreviewArgs {
    #[arg(long, help = "Chassis prefix, e.g. QTMS-")]
    prefix: String,
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=MAX_SLOT_COUNT as i64),
        help = "Number of slots in the chassis"
    )]
    slots: u32,
    #[arg(
        long = "card",
        help = "SLOT:SPAN:CODE[:inputs=N][:bushings=N], repeatable"
    )]
    cards: Vec<CardArg>,
    #[arg(long, action = ArgAction::SetTrue, help = "Append the remote display suffix")]
    remote_display: bool,
    #[arg(long, help = "Override the empty slot filler")]
    empty_slot_code: Option<String>,
    #[arg(long, help = "Override the remote display suffix")]
    remote_display_suffix: Option<String>,
}

#[derive(Args)]
struct IssueTokenArgs {
    #[arg(long, help = "Profile id; a random one is used when omitted")]
    user_id: Option<Uuid>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, help = "sales, admin or finance")]
    role: Role,
}

#[derive(Debug, Clone)]
struct CardArg(SlotCard);

impl FromStr for CardArg {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.split(':');
        let slot = parts
            .next()
            .ok_or_else(|| anyhow!("missing slot in '{}'", raw))?
            .parse::<u32>()
            .with_context(|| format!("invalid slot in '{}'", raw))?;
        let span = parts
            .next()
            .ok_or_else(|| anyhow!("missing span in '{}'", raw))?
            .parse::<u32>()
            .with_context(|| format!("invalid span in '{}'", raw))?;
        let code_template = parts
            .next()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| anyhow!("missing code in '{}'", raw))?
            .to_string();

        let mut values = TemplateValues::default();
        for extra in parts {
            match extra.split_once('=') {
                Some(("inputs", n)) => values.inputs = Some(n.parse()?),
                Some(("bushings", n)) => values.bushings = Some(n.parse()?),
                _ => bail!("unknown card attribute '{}' in '{}'", extra, raw),
            }
        }

        Ok(Self(SlotCard {
            slot,
            span,
            code_template,
            values,
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            let cfg = load()?;
            let pool = db::establish_connection_from_app_config(&cfg).await?;
            db::run_migrations(&pool).await?;
            println!("Migrations applied");
        }
        Commands::SeedCatalog => {
            let cfg = load()?;
            seed_catalog(&cfg).await?;
        }
        Commands::PreviewPartNumber(args) => {
            let part_number = preview(&args)?;
            if cli.json {
                print_json(&serde_json::json!({ "part_number": part_number }))?;
            } else {
                println!("{}", part_number);
            }
        }
        Commands::IssueToken(args) => {
            let cfg = load()?;
            let auth = AuthService::new(AuthConfig::from_app_config(&cfg));
            let user_id = args.user_id.unwrap_or_else(Uuid::new_v4);
            let token = auth.issue_token(user_id, args.email, args.role)?;
            if cli.json {
                print_json(&serde_json::json!({
                    "user_id": user_id,
                    "role": args.role,
                    "token": token,
                }))?;
            } else {
                println!("{}", token);
            }
        }
    }

    Ok(())
}

fn load() -> Result<AppConfig> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);
    Ok(cfg)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn preview(args: &PreviewArgs) -> Result<String> {
    if args.slots == 0 || args.slots > MAX_SLOT_COUNT as u32 {
        bail!("--slots must be between 1 and {}", MAX_SLOT_COUNT);
    }
    let mut options = PartNumberOptions::default();
    if let Some(code) = &args.empty_slot_code {
        options.empty_slot_code = code.clone();
    }
    if let Some(suffix) = &args.remote_display_suffix {
        options.remote_display_suffix = suffix.clone();
    }
    let chassis = ChassisSpec {
        prefix: args.prefix.clone(),
        slot_count: args.slots,
    };
    let cards: Vec<SlotCard> = args.cards.iter().map(|c| c.0.clone()).collect();
    Ok(assemble_part_number(
        &chassis,
        &cards,
        args.remote_display,
        &options,
    )?)
}

fn product(
    parent_id: Option<Uuid>,
    level: ProductLevel,
    name: &str,
    price: Decimal,
    cost: Decimal,
) -> CreateProductInput {
    CreateProductInput {
        parent_id,
        level: level.as_i32(),
        name: name.to_string(),
        description: None,
        part_number_code: None,
        slot_count: None,
        slot_span: None,
        input_count: None,
        bushing_count: None,
        price,
        cost,
        enabled: None,
        sort_order: None,
    }
}

async fn seed_catalog(cfg: &AppConfig) -> Result<()> {
    let pool = Arc::new(db::establish_connection_from_app_config(cfg).await?);
    let existing = Product::find().count(&*pool).await?;
    if existing > 0 {
        println!("Catalog already has {} products; nothing to do", existing);
        return Ok(());
    }

    let (sender, rx) = EventSender::channel(cfg.event_channel_capacity);
    let drain = tokio::spawn(events::process_events(rx));
    let catalog = CatalogService::new(pool, Arc::new(sender));
    let admin = AuthUser {
        user_id: Uuid::nil(),
        email: None,
        role: Role::Admin,
    };

    let family = catalog
        .create_product(
            &admin,
            product(None, ProductLevel::AssetFamily, "Transformer Monitoring", Decimal::ZERO, Decimal::ZERO),
        )
        .await?;

    let mut chassis = product(Some(family.id), ProductLevel::Chassis, "QTMS 6-slot chassis", dec!(2400), dec!(1100));
    chassis.part_number_code = Some("QTMS-".into());
    chassis.slot_count = Some(6);
    let chassis = catalog.create_product(&admin, chassis).await?;

    let mut analog = product(Some(chassis.id), ProductLevel::Card, "Analog input card", dec!(650), dec!(240));
    analog.part_number_code = Some("A{inputs}".into());
    let analog = catalog.create_product(&admin, analog).await?;

    let mut bushing = product(Some(chassis.id), ProductLevel::Card, "Bushing monitor card", dec!(1800), dec!(900));
    bushing.part_number_code = Some("B{bushings}".into());
    bushing.slot_span = Some(2);
    let bushing = catalog.create_product(&admin, bushing).await?;

    for inputs in [4, 8] {
        let mut option = product(
            Some(analog.id),
            ProductLevel::OptionSet,
            &format!("{} inputs", inputs),
            Decimal::from(inputs * 25),
            Decimal::from(inputs * 8),
        );
        option.input_count = Some(inputs);
        catalog.create_product(&admin, option).await?;
    }
    for bushings in [3, 6] {
        let mut option = product(
            Some(bushing.id),
            ProductLevel::OptionSet,
            &format!("{} bushings", bushings),
            Decimal::from(bushings * 120),
            Decimal::from(bushings * 45),
        );
        option.bushing_count = Some(bushings);
        catalog.create_product(&admin, option).await?;
    }

    drop(catalog);
    let _ = drain.await;
    info!("demo catalog created");
    println!("Seeded demo catalog under '{}'", family.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_argument_parses_counts() {
        let card: CardArg = "3:2:B{bushings}:bushings=6".parse().unwrap();
        assert_eq!(card.0.slot, 3);
        assert_eq!(card.0.span, 2);
        assert_eq!(card.0.values.bushings, Some(6));
        assert!("3:x:A".parse::<CardArg>().is_err());
        assert!("1:1:A:colour=red".parse::<CardArg>().is_err());
    }

    #[test]
    fn preview_matches_service_layout() {
        let args = PreviewArgs {
            prefix: "QTMS-".into(),
            slots: 4,
            cards: vec![
                "1:1:A{inputs}:inputs=4".parse().unwrap(),
                "3:2:B{bushings}:bushings=3".parse().unwrap(),
            ],
            remote_display: true,
            empty_slot_code: None,
            remote_display_suffix: None,
        };
        assert_eq!(preview(&args).unwrap(), "QTMS-A4XB3-RD");
    }

    #[test]
    fn preview_rejects_oversized_chassis() {
        let args = PreviewArgs {
            prefix: "QTMS-".into(),
            slots: 4_000_000_000,
            cards: vec![],
            remote_display: false,
            empty_slot_code: None,
            remote_display_suffix: None,
        };
        assert!(preview(&args).is_err());

        let parsed = Cli::try_parse_from([
            "quote-admin",
            "preview-part-number",
            "--prefix",
            "QTMS-",
            "--slots",
            "4000000000",
        ]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from([
            "quote-admin",
            "preview-part-number",
            "--prefix",
            "QTMS-",
            "--slots",
            "4",
        ]);
        assert!(parsed.is_ok());
    }
}
