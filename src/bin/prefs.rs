use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rx_prefs::config::{self, StoreConfig, DATA_DIR_ENV, DEFAULT_DATA_DIR, DEFAULT_NAME, NAME_ENV};
use rx_prefs::{Preference, RxPreferences};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(short, long, env = NAME_ENV, default_value = DEFAULT_NAME)]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Get {
        key: String,
        #[arg(short, long, value_enum, default_value_t = Kind::Text)]
        kind: Kind,
        #[arg(long)]
        default: Option<String>,
    },
    Set {
        key: String,
        value: String,
        #[arg(short, long, value_enum, default_value_t = Kind::Text)]
        kind: Kind,
    },
    Del { key: String },
    List,
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    #[value(name = "string")]
    Text,
    Bool,
    Int,
    Long,
    Float,
    StringSet,
}

fn parse<T>(raw: &str, kind: Kind) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("invalid {:?} value {:?}", kind, raw))
}

fn parse_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_value<T: Display>(pref: &Preference<T>)
where
    T: Clone + Send + Sync + 'static,
{
    println!("{}", pref.get());
}

fn write<T>(pref: &Preference<T>, value: T) -> anyhow::Result<()>
where
    T: Clone + Send + Sync + 'static,
{
    if !pref.set_sync(value) {
        bail!("failed to persist {:?}", pref.key());
    }
    println!("OK");
    Ok(())
}

fn get(rx: &RxPreferences, key: &str, kind: Kind, default: Option<&str>) -> anyhow::Result<()> {
    match kind {
        Kind::Text => print_value(&rx.get_string(key, default.unwrap_or_default())),
        Kind::Bool => match default {
            Some(d) => print_value(&rx.get_bool(key, parse(d, kind)?)),
            None => print_value(&rx.get_bool_default(key)),
        },
        Kind::Int => match default {
            Some(d) => print_value(&rx.get_integer(key, parse(d, kind)?)),
            None => print_value(&rx.get_integer_default(key)),
        },
        Kind::Long => match default {
            Some(d) => print_value(&rx.get_long(key, parse(d, kind)?)),
            None => print_value(&rx.get_long_default(key)),
        },
        Kind::Float => match default {
            Some(d) => print_value(&rx.get_float(key, parse(d, kind)?)),
            None => print_value(&rx.get_float_default(key)),
        },
        Kind::StringSet => {
            let pref = rx.get_string_set(key, default.map(parse_set).unwrap_or_default());
            println!("{}", serde_json::to_string(&pref.get())?);
        }
    }
    Ok(())
}

fn set(rx: &RxPreferences, key: &str, value: &str, kind: Kind) -> anyhow::Result<()> {
    match kind {
        Kind::Text => write(&rx.get_string_default(key), value.to_string()),
        Kind::Bool => write(&rx.get_bool_default(key), parse(value, kind)?),
        Kind::Int => write(&rx.get_integer_default(key), parse(value, kind)?),
        Kind::Long => write(&rx.get_long_default(key), parse(value, kind)?),
        Kind::Float => write(&rx.get_float_default(key), parse(value, kind)?),
        Kind::StringSet => write(&rx.get_string_set_default(key), parse_set(value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = config::open(&StoreConfig {
        data_dir: cli.data_dir,
        name: cli.name,
    })?;
    let rx = RxPreferences::create(store.clone());

    match cli.command {
        Commands::Get { key, kind, default } => get(&rx, &key, kind, default.as_deref())?,
        Commands::Set { key, value, kind } => set(&rx, &key, &value, kind)?,
        Commands::Del { key } => {
            let pref = rx.get_string_default(&key);
            if !pref.is_set() {
                bail!("key not found: {}", key);
            }
            pref.delete();
            println!("OK");
        }
        Commands::List => {
            let all: std::collections::BTreeMap<_, _> =
                rx.preferences().all().into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
        Commands::Clear => {
            rx.clear();
            println!("OK");
        }
    }

    // delete and clear commit in the background
    store.wait().await;
    Ok(())
}
