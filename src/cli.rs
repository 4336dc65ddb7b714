// Places CLI binary

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use serde::Serialize;

use places_lib::bookmarks::{BookmarkItem, BookmarkUpdateInfo};
use places_lib::history::VisitObservation;
use places_lib::{
    db, FrecencyThresholdOption, Guid, PlacesApi, StoreOptions, Timestamp, VisitType,
    VisitTransitionSet,
};

#[derive(Parser)]
#[command(name = "places")]
#[command(about = "Places - bookmarks and browsing history store", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file (defaults to ~/.places/places.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// JSON options file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a bookmark subtree
    Tree {
        /// Folder GUID
        #[arg(default_value = "root________")]
        guid: String,
    },

    /// Show a single bookmark node
    Show {
        guid: String,
    },

    /// Create a folder
    Mkdir {
        /// Parent folder GUID
        parent: String,
        title: String,
        #[arg(short, long)]
        position: Option<u32>,
    },

    /// Bookmark a URL
    Add {
        /// Parent folder GUID
        parent: String,
        url: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        position: Option<u32>,
    },

    /// Delete a node and everything under it
    Rm {
        guid: String,
    },

    /// Move a node
    Mv {
        guid: String,
        /// New parent folder GUID (defaults to the current parent)
        #[arg(long)]
        parent: Option<String>,
        #[arg(short, long)]
        position: Option<u32>,
    },

    /// Record a visit
    Visit {
        url: String,
        /// One of link, typed, bookmark, embed, redirect_permanent,
        /// redirect_temporary, download, framed_link, reload
        #[arg(long, default_value = "link")]
        transition: String,
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List recent visits, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Most frecent sites
    TopSites {
        #[arg(long, default_value = "10")]
        limit: i32,
        /// Hide pages visited only once
        #[arg(long)]
        skip_one_time: bool,
    },

    /// Autocomplete against history and bookmarks
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Run database housekeeping
    Maintenance,

    /// Delete old visits according to the configured limits
    Prune,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = open_store(cli.db, cli.config)?;

    match cli.command {
        Commands::Tree { guid } => cmd_tree(&api, guid),
        Commands::Show { guid } => cmd_show(&api, guid),
        Commands::Mkdir { parent, title, position } => cmd_mkdir(&api, parent, title, position),
        Commands::Add { parent, url, title, position } => cmd_add(&api, parent, url, title, position),
        Commands::Rm { guid } => cmd_rm(&api, guid),
        Commands::Mv { guid, parent, position } => cmd_mv(&api, guid, parent, position),
        Commands::Visit { url, transition, title } => cmd_visit(&api, url, transition, title),
        Commands::History { limit } => cmd_history(&api, limit),
        Commands::TopSites { limit, skip_one_time } => cmd_top_sites(&api, limit, skip_one_time),
        Commands::Search { query, limit } => cmd_search(&api, query, limit),
        Commands::Maintenance => cmd_maintenance(&api),
        Commands::Prune => cmd_prune(&api),
    }
}

fn open_store(db_path: Option<PathBuf>, config: Option<PathBuf>) -> Result<PlacesApi> {
    let db_path = match db_path {
        Some(p) => p,
        None => db::default_db_path()?,
    };
    let options = match config {
        Some(path) => StoreOptions::load(&path)?,
        None => StoreOptions::default(),
    };
    PlacesApi::open_with_options(&db_path, options)
        .with_context(|| format!("Failed to open {}", db_path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_tree(api: &PlacesApi, guid: String) -> Result<()> {
    let reader = api.open_reader()?;
    match reader.get_bookmarks_tree(&Guid::from(guid.as_str()), true)? {
        Some(tree) => {
            print_tree(&tree, 0);
            Ok(())
        }
        None => anyhow::bail!("No bookmark with GUID {}", guid),
    }
}

fn print_tree(item: &BookmarkItem, depth: usize) {
    let indent = "  ".repeat(depth);
    match item {
        BookmarkItem::Folder(f) => {
            println!("{}[{}] {}", indent, f.guid, f.title.as_deref().unwrap_or(""));
            for child in f.child_nodes.iter().flatten() {
                print_tree(child, depth + 1);
            }
        }
        BookmarkItem::Bookmark(b) => {
            println!("{}{} {} <{}>", indent, b.guid, b.title.as_deref().unwrap_or(""), b.url);
        }
        BookmarkItem::Separator(s) => {
            println!("{}{} ----", indent, s.guid);
        }
    }
}

fn cmd_show(api: &PlacesApi, guid: String) -> Result<()> {
    let reader = api.open_reader()?;
    match reader.get_bookmark(&Guid::from(guid.as_str()))? {
        Some(item) => print_json(&item),
        None => anyhow::bail!("No bookmark with GUID {}", guid),
    }
}

fn cmd_mkdir(api: &PlacesApi, parent: String, title: String, position: Option<u32>) -> Result<()> {
    let guid = api.get_writer().create_folder(&Guid::from(parent.as_str()), &title, position)?;
    println!("Created folder {}", guid);
    Ok(())
}

fn cmd_add(
    api: &PlacesApi,
    parent: String,
    url: String,
    title: Option<String>,
    position: Option<u32>,
) -> Result<()> {
    let guid = api
        .get_writer()
        .create_bookmark(&Guid::from(parent.as_str()), &url, title.as_deref(), position)?;
    println!("Created bookmark {}", guid);
    Ok(())
}

fn cmd_rm(api: &PlacesApi, guid: String) -> Result<()> {
    if api.get_writer().delete_bookmark_node(&Guid::from(guid.as_str()))? {
        println!("Deleted {}", guid);
    } else {
        println!("Nothing to delete: {} does not exist", guid);
    }
    Ok(())
}

fn cmd_mv(api: &PlacesApi, guid: String, parent: Option<String>, position: Option<u32>) -> Result<()> {
    if parent.is_none() && position.is_none() {
        anyhow::bail!("Nothing to do: pass --parent and/or --position");
    }
    api.get_writer().update_bookmark_node(BookmarkUpdateInfo {
        guid: Guid::from(guid.as_str()),
        parent_guid: parent.map(Guid::from),
        position,
        ..Default::default()
    })?;
    println!("Moved {}", guid);
    Ok(())
}

fn cmd_visit(api: &PlacesApi, url: String, transition: String, title: Option<String>) -> Result<()> {
    let visit_type = VisitType::parse(&transition)
        .with_context(|| format!("Unknown transition '{}'", transition))?;
    let mut observation = VisitObservation::new(url.as_str())
        .with_visit_type(visit_type)
        .with_at(Timestamp::now());
    if let Some(title) = title {
        observation = observation.with_title(title);
    }
    api.get_writer().apply_observation(observation)?;
    println!("Recorded {} visit to {}", transition, url);
    Ok(())
}

fn cmd_history(api: &PlacesApi, limit: i64) -> Result<()> {
    let reader = api.open_reader()?;
    let total = reader.get_visit_count(VisitTransitionSet::empty())?;
    let page = reader.get_visit_page_with_bound(Timestamp::now().as_millis(), 0, limit, VisitTransitionSet::empty())?;

    println!("{} visits total", total);
    println!();
    if page.infos.is_empty() {
        println!("No history yet. Use 'places visit <url>' to record one.");
        return Ok(());
    }

    println!("{:>16}  {:>18}  {}", "When", "Type", "URL");
    println!("{}", "-".repeat(70));
    for info in &page.infos {
        let when = chrono::DateTime::from_timestamp_millis(info.timestamp.as_millis())
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>16}  {:>18}  {}", when, format!("{:?}", info.visit_type), info.url);
    }
    Ok(())
}

fn cmd_top_sites(api: &PlacesApi, limit: i32, skip_one_time: bool) -> Result<()> {
    let threshold = if skip_one_time {
        FrecencyThresholdOption::SkipOneTimePages
    } else {
        FrecencyThresholdOption::None
    };
    let sites = api.open_reader()?.get_top_frecent_site_infos(limit, threshold)?;
    print_json(&sites)
}

fn cmd_search(api: &PlacesApi, query: String, limit: u32) -> Result<()> {
    let results = api.open_reader()?.query_autocomplete(&query, limit)?;
    print_json(&results)
}

fn cmd_maintenance(api: &PlacesApi) -> Result<()> {
    api.get_writer().run_maintenance()?;
    println!("Maintenance complete");
    Ok(())
}

fn cmd_prune(api: &PlacesApi) -> Result<()> {
    let removed = api.get_writer().prune_destructively()?;
    println!("Removed {} visits", removed);
    Ok(())
}
