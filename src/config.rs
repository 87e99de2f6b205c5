use tracing::info;

use crate::AppResult;

const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub nominatim_url: String,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn load() -> AppResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            info!("loaded environment from {}", path.display());
        }

        Ok(Self {
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_owned(),
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            nominatim_url: dotenv::var("NOMINATIM_URL").unwrap_or_else(|_| {
                info!("NOMINATIM_URL not set, using default: {DEFAULT_NOMINATIM_URL}");
                DEFAULT_NOMINATIM_URL.to_owned()
            }),
        })
    }
}

fn required(key: &str) -> AppResult<String> {
    dotenv::var(key)
        .map(|value| value.trim().to_owned())
        .map_err(|_| format!("environment variable {key} is required").into())
}
