// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use foodgram::cart;
use foodgram::catalog;
use foodgram::database::{self, models::NewIngredient, models::NewTag, models::NewUser};
use foodgram::import;
use foodgram::policy::Actor;
use foodgram::users;
use std::path::PathBuf;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(about = "Maintenance tool for the foodgram recipe database")]
struct Args {
    /// SQLite database to use instead of the one in the user data directory.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load ingredients from a JSON array of {"name", "measurement_unit"}.
    ImportIngredients { path: PathBuf },
    AddUser {
        username: String,
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        staff: bool,
    },
    AddTag {
        /// Staff user to act as.
        #[arg(long = "as")]
        as_user: String,
        name: String,
        color: String,
        slug: String,
    },
    AddIngredient {
        /// Staff user to act as.
        #[arg(long = "as")]
        as_user: String,
        name: String,
        measurement_unit: String,
    },
    /// Write the summed ingredients of a user's cart to a text file.
    ShoppingList {
        username: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// This is where the database and other user-data lives on-disk. On Linux it should be like:
/// `~/.local/share/foodgram/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or_else(|| {
        foodgram::Error::Config("failed to get user home directory".into())
    })?;
    let path = dirs.data_dir().join("foodgram");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn acting_user(conn: &mut database::Connection, username: &str) -> Result<Actor> {
    Ok(Actor::from(&users::find_user_by_username(conn, username)?))
}

fn write_shopping_list(
    conn: &mut database::Connection,
    username: &str,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    let user = users::find_user_by_username(conn, username)?;
    let report = cart::download_shopping_list(conn, &Actor::from(&user))?;
    let path = match output {
        Some(path) => path,
        None => {
            let dir = data_path()?.join("shopping-lists");
            std::fs::create_dir_all(&dir)?;
            dir.join(format!("{username}-{}", cart::SHOPPING_LIST_FILE_NAME))
        }
    };
    std::fs::write(&path, format!("{report}\n"))?;
    log::info!(
        "{} item(s) for {} written to {}",
        report.items.len(),
        user.display_name(),
        path.display()
    );
    Ok(path)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new().with_level(level).init()?;

    let database_path = match args.database {
        Some(path) => path,
        None => data_path()?.join("data.sqlite"),
    };
    let mut conn = database::establish_connection(database_path)?;

    match args.commands {
        Commands::ImportIngredients { path } => {
            import::import_ingredients(&mut conn, path)?;
        }
        Commands::AddUser {
            username,
            email,
            first_name,
            last_name,
            staff,
        } => {
            users::create_user(
                &mut conn,
                &NewUser {
                    username,
                    email,
                    first_name,
                    last_name,
                    is_staff: staff,
                },
            )?;
        }
        Commands::AddTag {
            as_user,
            name,
            color,
            slug,
        } => {
            let actor = acting_user(&mut conn, &as_user)?;
            catalog::create_tag(&mut conn, &actor, &NewTag { name, color, slug })?;
        }
        Commands::AddIngredient {
            as_user,
            name,
            measurement_unit,
        } => {
            let actor = acting_user(&mut conn, &as_user)?;
            catalog::create_ingredient(
                &mut conn,
                &actor,
                &NewIngredient {
                    name,
                    measurement_unit,
                },
            )?;
        }
        Commands::ShoppingList { username, output } => {
            let path = write_shopping_list(&mut conn, &username, output)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
