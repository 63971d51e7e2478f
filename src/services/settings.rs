//! Developer settings: runtime switches edited from the settings panel.
//!
//! Stored as one JSON document under the `developer` key of `app_settings`.
//! Missing keys fall back to defaults, so older documents keep loading after
//! new fields are added.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::ServiceError;

const SETTINGS_KEY: &str = "developer";
pub const DEFAULT_POLL_INTERVAL_SECS: u32 = 3;
const MAX_POLL_INTERVAL_SECS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeveloperSettings {
    pub ai_parsing_enabled: bool,
    pub whatsapp_enabled: bool,
    pub default_match_fee_paise: i64,
    /// Supports `{name}`, `{opponent}` and `{date}`.
    pub reminder_template: String,
    pub poll_interval_secs: u32,
}

impl Default for DeveloperSettings {
    fn default() -> Self {
        Self {
            ai_parsing_enabled: true,
            whatsapp_enabled: true,
            default_match_fee_paise: 0,
            reminder_template: "Hi {name}, are you available for the match against {opponent} on {date}? \
                                Reply YES, NO or MAYBE."
                .into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub ai_parsing_enabled: Option<bool>,
    pub whatsapp_enabled: Option<bool>,
    pub default_match_fee_paise: Option<i64>,
    pub reminder_template: Option<String>,
    pub poll_interval_secs: Option<u32>,
}

impl DeveloperSettings {
    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Invalid`] for a negative fee, an empty
    /// template, or a poll interval outside `1..=60`.
    pub fn apply(mut self, update: SettingsUpdate) -> Result<Self, ServiceError> {
        if let Some(v) = update.ai_parsing_enabled {
            self.ai_parsing_enabled = v;
        }
        if let Some(v) = update.whatsapp_enabled {
            self.whatsapp_enabled = v;
        }
        if let Some(fee) = update.default_match_fee_paise {
            if fee < 0 {
                return Err(ServiceError::Invalid("default match fee must be >= 0".into()));
            }
            self.default_match_fee_paise = fee;
        }
        if let Some(template) = update.reminder_template {
            if template.trim().is_empty() {
                return Err(ServiceError::Invalid("reminder template must not be empty".into()));
            }
            self.reminder_template = template;
        }
        if let Some(secs) = update.poll_interval_secs {
            if !(1..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
                return Err(ServiceError::Invalid(format!(
                    "poll interval must be between 1 and {MAX_POLL_INTERVAL_SECS} seconds"
                )));
            }
            self.poll_interval_secs = secs;
        }
        Ok(self)
    }

    /// Fill the reminder template for one player.
    #[must_use]
    pub fn render_reminder(&self, name: &str, opponent: &str, date: &str) -> String {
        self.reminder_template
            .replace("{name}", name)
            .replace("{opponent}", opponent)
            .replace("{date}", date)
    }
}

/// Load settings, falling back to defaults when none are stored.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_settings(pool: &PgPool) -> Result<DeveloperSettings, ServiceError> {
    let value: Option<serde_json::Value> = sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
        .bind(SETTINGS_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(value.map(decode).unwrap_or_default())
}

fn decode(value: serde_json::Value) -> DeveloperSettings {
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored settings unreadable; using defaults");
        DeveloperSettings::default()
    })
}

/// Merge and persist a partial update.
///
/// # Errors
///
/// Returns a validation error or a database error.
pub async fn update_settings(pool: &PgPool, update: SettingsUpdate) -> Result<DeveloperSettings, ServiceError> {
    let settings = get_settings(pool).await?.apply(update)?;
    let value = serde_json::to_value(&settings).map_err(|e| ServiceError::Invalid(e.to_string()))?;
    sqlx::query(
        "INSERT INTO app_settings (key, value, updated_at) VALUES ($1, $2, now())
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
    )
    .bind(SETTINGS_KEY)
    .bind(value)
    .execute(pool)
    .await?;
    tracing::info!(?settings, "settings updated");
    Ok(settings)
}
