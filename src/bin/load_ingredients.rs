use std::path::PathBuf;

use clap::Parser;
use foodgram_sdk::{
    actions::{import_ingredients, IngredientRecord},
    connect_cache, connect_database,
};

/// Loads ingredients from a JSON file of `{"name", "measurement_unit"}` objects.
#[derive(Parser, Debug)]
#[command(name = "load_ingredients", version)]
struct Args {
    /// Path to the JSON seed file
    #[arg(short, long)]
    file: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Ingredient listings cached here are invalidated after the import
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
}

async fn run(args: Args) -> Result<u64, String> {
    let data = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", args.file.display()))?;
    let records: Vec<IngredientRecord> =
        serde_json::from_str(&data).map_err(|e| format!("Invalid seed file: {e}"))?;

    let pool = connect_database(&args.database_url)
        .await
        .map_err(|e| format!("{:?}", e.info))?;
    let mut cache = match &args.redis_url {
        Some(url) => Some(connect_cache(url).await.map_err(|e| format!("{:?}", e.info))?),
        None => None,
    };

    import_ingredients(&records, &pool, cache.as_mut())
        .await
        .map_err(|e| format!("{:?}", e.info))
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    match run(args).await {
        Ok(inserted) => log::info!("Done, {inserted} ingredients loaded"),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
