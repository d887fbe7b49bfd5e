mod assistant;
mod config;
mod estimate;
mod estimate_db;
mod measurement;
mod number;
mod price_list;
mod report;

use assistant::{ChatClient, describe_item, filter_price_items};
use clap::{Parser, Subcommand, ValueEnum};
use estimate::{Estimate, LineItem};
use estimate_db::EstimateStore;
use measurement::{LinkedMode, Measurement, MeasurementKind};
use number::{format_it, parse_number};
use price_list::{PriceItem, filter_items, load_price_list};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "computo")]
#[command(about = "Bills of quantities from construction price lists")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = ".config/computo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a price list (XML, CSV/TXT or text PDF)
    Import {
        file: PathBuf,

        /// Source name stored with the entries (defaults to the file name)
        #[arg(long)]
        source: Option<String>,
    },

    /// Keyword search over imported price entries
    Search {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Search this price-list file instead of the store
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Add or update a single price entry by hand
    AddPrice {
        code: String,
        description: String,
        unit: String,
        price: String,

        #[arg(long)]
        chapter: Option<String>,

        #[arg(long, default_value = "manual")]
        source: String,
    },

    /// Natural-language search over imported price entries
    Ask {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Create an empty estimate
    New {
        name: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        location: Option<String>,
    },

    /// List saved estimates with their totals
    List,

    /// Delete a saved estimate
    Delete { name: String },

    /// Add a category (chapter) to an estimate
    AddCategory {
        estimate: String,
        code: String,
        name: String,
    },

    /// Add a line item; known price codes are filled in from the store
    AddItem {
        estimate: String,

        /// Category id or code
        category: String,

        /// Price code
        code: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        unit: Option<String>,

        /// Unit price (overrides the price list)
        #[arg(long)]
        price: Option<String>,

        /// Quantity for items without measurements
        #[arg(long)]
        quantity: Option<String>,
    },

    /// Remove a line item
    RemoveItem { estimate: String, item: String },

    /// Add a measurement row to a line item
    #[command(after_help = "\
Examples:
  computo measure villa I2 'north wall' --l 5 --h 3
  computo measure villa I2 'door' --kind deduction --l 0,9 --h 2,1
  computo measure villa I2 --kind subtotal
  computo measure villa I4 'as excavation' --link I2 --mult 0,5")]
    Measure {
        estimate: String,

        /// Line item id
        item: String,

        #[arg(default_value = "")]
        description: String,

        #[arg(long, value_enum, default_value_t = KindArg::Normal)]
        kind: KindArg,

        #[arg(long)]
        mult: Option<String>,

        /// Length
        #[arg(long)]
        l: Option<String>,

        /// Width
        #[arg(long)]
        w: Option<String>,

        /// Height or weight
        #[arg(long)]
        h: Option<String>,

        /// Reuse the quantity or amount of another line item
        #[arg(long, value_name = "ITEM")]
        link: Option<String>,

        #[arg(long, value_enum, default_value_t = LinkArg::Quantity)]
        link_mode: LinkArg,
    },

    /// Remove a measurement row
    RemoveMeasurement {
        estimate: String,
        item: String,
        measurement: String,
    },

    /// Print the bill of quantities
    Show { estimate: String },

    /// Write the bill of quantities as PDF
    Report {
        estimate: String,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Export the estimate and its totals as JSON
    Export {
        estimate: String,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Load an estimate from a JSON file
    Load {
        file: PathBuf,

        /// Save under this name instead of the one in the file
        #[arg(long)]
        name: Option<String>,
    },

    /// Generate a full technical description for a line item
    Describe {
        estimate: String,
        item: String,

        /// Replace the item's description with the generated one
        #[arg(long)]
        apply: bool,
    },

    /// Set a configuration value (e.g. llm.backend ollama)
    ConfigSet { key: String, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Normal,
    Deduction,
    Subtotal,
}

impl From<KindArg> for MeasurementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Normal => MeasurementKind::Normal,
            KindArg::Deduction => MeasurementKind::Deduction,
            KindArg::Subtotal => MeasurementKind::Subtotal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LinkArg {
    Quantity,
    Amount,
}

impl From<LinkArg> for LinkedMode {
    fn from(mode: LinkArg) -> Self {
        match mode {
            LinkArg::Quantity => LinkedMode::Quantity,
            LinkArg::Amount => LinkedMode::Amount,
        }
    }
}

/// Unparsable numbers are dropped with a warning, like blank fields.
fn number_arg(name: &str, raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    let parsed = parse_number(raw);
    if parsed.is_none() {
        warn!(field = name, value = raw, "Not a number — ignored");
    }
    parsed
}

fn open_estimate(store: &EstimateStore, name: &str) -> Result<Estimate, Box<dyn std::error::Error>> {
    store
        .load_estimate(name)?
        .ok_or_else(|| format!("No estimate named {name:?}").into())
}

fn print_price_items<'a>(items: impl IntoIterator<Item = &'a PriceItem>, currency: &str) {
    for item in items {
        let price = item
            .unit_price
            .map(|p| format!("{} {currency}", format_it(p, 2)))
            .unwrap_or_else(|| "-".to_string());
        let description: String = item.description.chars().take(90).collect();
        println!("{:<18} {:>14} {:<6} {}", item.code, price, item.unit, description);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::ConfigSet { key, value } = &cli.command {
        return config::Config::set_value(&cli.config, key, value);
    }

    let cfg = config::Config::load_or_default(&cli.config)?;
    if let Some(parent) = Path::new(&cfg.db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut db = EstimateStore::new(&cfg.db_path)?;
    let currency = cfg.report.currency.as_str();

    match cli.command {
        Commands::Import { file, source } => {
            let mut list = load_price_list(&file)?;
            if let Some(source) = source {
                list.source = source;
            }
            let (priced, total) = list.coverage();
            let imported = db.import_price_list(&list)?;
            info!(
                source = %list.source,
                imported,
                priced,
                total,
                "Price list imported"
            );
            println!("Imported {imported} entries from {}", file.display());
        }

        Commands::Search { query, limit, file } => match file {
            Some(file) => {
                let list = load_price_list(&file)?;
                let hits = list.filter(&query);
                info!(query = %query, hits = hits.len(), source = %list.source, "Search");
                print_price_items(hits.into_iter().take(limit), currency);
            }
            None => {
                let hits = db.search_price_items(&query, limit)?;
                info!(query = %query, hits = hits.len(), "Search");
                print_price_items(hits.iter().map(|h| &h.item), currency);
            }
        },

        Commands::AddPrice {
            code,
            description,
            unit,
            price,
            chapter,
            source,
        } => {
            let item = PriceItem {
                code,
                description,
                unit,
                unit_price: number_arg("price", Some(&price)),
                chapter,
            };
            let uid = db.upsert_price_item(&source, &item)?;
            info!(uid = %uid, code = %item.code, source = %source, "Price entry stored");
            print_price_items([&item], currency);
        }

        Commands::Ask { query, limit } => {
            let items = db.all_price_items()?;
            let hits = match ChatClient::connect(&cfg.llm).await {
                Ok(client) => filter_price_items(&client, &query, &items).await,
                Err(e) => {
                    warn!(error = %e, "AI search unavailable — using keyword search");
                    filter_items(&items, &query)
                }
            };
            print_price_items(hits.into_iter().take(limit), currency);
        }

        Commands::New {
            name,
            title,
            client,
            location,
        } => {
            if db.load_estimate(&name)?.is_some() {
                return Err(format!("Estimate {name:?} already exists").into());
            }
            let mut est = Estimate::new(&name);
            if let Some(title) = title {
                est.title = title;
            }
            est.client = client;
            est.location = location;
            db.save_estimate(&est)?;
            println!("Created estimate {name}");
        }

        Commands::List => {
            for name in db.list_estimates()? {
                let total = db
                    .load_estimate(&name)?
                    .map(|e| e.grand_total())
                    .unwrap_or_default();
                println!("{:<30} {:>16} {currency}", name, format_it(total, 2));
            }
        }

        Commands::Delete { name } => {
            if !db.delete_estimate(&name)? {
                return Err(format!("No estimate named {name:?}").into());
            }
            println!("Deleted {name}");
        }

        Commands::AddCategory {
            estimate,
            code,
            name,
        } => {
            let mut est = open_estimate(&db, &estimate)?;
            let id = est.add_category(code, name)?;
            db.save_estimate(&est)?;
            println!("{id}");
        }

        Commands::AddItem {
            estimate,
            category,
            code,
            description,
            unit,
            price,
            quantity,
        } => {
            let mut est = open_estimate(&db, &estimate)?;
            let mut item = match db.get_price_item(&code)? {
                Some(stored) => {
                    info!(code = %code, source = %stored.source, "Filled from price list");
                    LineItem::from_price_item(&stored.item)
                }
                None => {
                    warn!(code = %code, "Code not in any imported price list");
                    LineItem {
                        code: code.clone(),
                        ..LineItem::default()
                    }
                }
            };
            if let Some(description) = description {
                item.description = description;
            }
            if let Some(unit) = unit {
                item.unit = unit;
            }
            if let Some(price) = number_arg("price", price.as_deref()) {
                item.unit_price = price;
            }
            if let Some(quantity) = number_arg("quantity", quantity.as_deref()) {
                item.quantity = quantity;
            }

            let id = est.add_item(&category, item)?;
            db.save_estimate(&est)?;
            match est.category(&category) {
                Some(cat) => println!("{id} in {} {}", cat.code, cat.name),
                None => println!("{id}"),
            }
        }

        Commands::RemoveItem { estimate, item } => {
            let mut est = open_estimate(&db, &estimate)?;
            let removed = est
                .remove_item(&item)
                .ok_or_else(|| format!("No line item with id {item:?}"))?;
            db.save_estimate(&est)?;
            println!("Removed {} {}", removed.id, removed.code);
        }

        Commands::Measure {
            estimate,
            item,
            description,
            kind,
            mult,
            l,
            w,
            h,
            link,
            link_mode,
        } => {
            let mut est = open_estimate(&db, &estimate)?;
            let kind = MeasurementKind::from(kind);
            let row = match (kind, link) {
                (MeasurementKind::Subtotal, _) => Measurement::subtotal(description),
                (_, Some(target)) => Measurement::linked(description, target, link_mode.into()),
                (_, None) => Measurement::dimensions(
                    description,
                    number_arg("l", l.as_deref()),
                    number_arg("w", w.as_deref()),
                    number_arg("h", h.as_deref()),
                ),
            }
            .with_kind(kind);
            let row = match number_arg("mult", mult.as_deref()) {
                Some(m) if kind != MeasurementKind::Subtotal => row.with_multiplier(m),
                _ => row,
            };

            let id = est.add_measurement(&item, row)?;
            db.save_estimate(&est)?;
            let quantity = est.item(&item).map(|i| i.quantity).unwrap_or_default();
            println!("{id}: {item} quantity now {}", format_it(quantity, 3));
        }

        Commands::RemoveMeasurement {
            estimate,
            item,
            measurement,
        } => {
            let mut est = open_estimate(&db, &estimate)?;
            let removed = est.remove_measurement(&item, &measurement)?;
            db.save_estimate(&est)?;
            println!("Removed {} {}", removed.id, removed.description);
        }

        Commands::Show { estimate } => {
            let est = open_estimate(&db, &estimate)?;
            let report = report::build_report(&est, &cfg.report, &report::today());
            print!("{}", report::render_text(&report));
        }

        Commands::Report { estimate, output } => {
            let est = open_estimate(&db, &estimate)?;
            let report = report::build_report(&est, &cfg.report, &report::today());
            let bytes = report::render_pdf(&report)?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", est.name)));
            std::fs::write(&output, &bytes)?;
            info!(path = %output.display(), bytes = bytes.len(), "PDF written");
            println!("Wrote {}", output.display());
        }

        Commands::Export { estimate, output } => {
            let est = open_estimate(&db, &estimate)?;
            let report = report::build_report(&est, &cfg.report, &report::today());
            let json = report::export_json(&est, &report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Commands::Load { file, name } => {
            let content = std::fs::read_to_string(&file)?;
            let mut est: Estimate = serde_json::from_str(&content)?;
            if let Some(name) = name {
                est.name = name;
            }
            if est.name.trim().is_empty() {
                return Err("Estimate has no name; pass --name".into());
            }
            est.recalculate();
            db.save_estimate(&est)?;
            println!(
                "Loaded {} ({} items, total {} {currency})",
                est.name,
                est.items().count(),
                format_it(est.grand_total(), 2)
            );
        }

        Commands::Describe {
            estimate,
            item,
            apply,
        } => {
            let mut est = open_estimate(&db, &estimate)?;
            let client = ChatClient::connect(&cfg.llm).await?;
            let line = est
                .item(&item)
                .ok_or_else(|| format!("No line item with id {item:?}"))?;
            let text = describe_item(&client, line).await?;
            println!("{text}");
            if apply {
                if let Some(line) = est.item_mut(&item) {
                    line.description = text;
                }
                db.save_estimate(&est)?;
            }
        }

        // Handled before the config is loaded.
        Commands::ConfigSet { .. } => {}
    }

    // Print statistics
    let counts = db.get_counts()?;
    info!(
        price_items = counts.price_items,
        price_sources = counts.price_sources,
        estimates = counts.estimates,
        "Database statistics"
    );

    Ok(())
}
