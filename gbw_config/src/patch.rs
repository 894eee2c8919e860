//! Field contract of the configuration page.
//!
//! The page posts either JSON or a form-encoded body with the same flat field
//! names the appliance persists; GET returns `SettingsView`.
use serde::{Deserialize, Serialize};

/// Partial update. Absent fields are left alone; unknown fields are ignored
/// in both encodings.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct SettingsPatch {
    #[serde(rename = "setWeight", default)]
    pub set_weight: Option<f32>,
    #[serde(default)]
    pub offset: Option<f32>,
    #[serde(rename = "scaleMode", default)]
    pub scale_mode: Option<bool>,
    #[serde(rename = "grindMode", default)]
    pub grind_mode: Option<bool>,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsView {
    #[serde(rename = "setWeight")]
    pub set_weight: f32,
    pub offset: f32,
    #[serde(rename = "scaleMode")]
    pub scale_mode: bool,
    #[serde(rename = "grindMode")]
    pub grind_mode: bool,
}

impl SettingsView {
    pub fn to_json(&self) -> eyre::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn parse_bool(field: &str, v: &str) -> eyre::Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => eyre::bail!("{field} must be a boolean (got {other:?})"),
    }
}

fn parse_f32(field: &str, v: &str) -> eyre::Result<f32> {
    v.trim()
        .parse::<f32>()
        .map_err(|e| eyre::eyre!("{field} must be a number (got {v:?}): {e}"))
}

impl SettingsPatch {
    pub fn from_json(body: &str) -> eyre::Result<Self> {
        serde_json::from_str(body).map_err(|e| eyre::eyre!("invalid settings JSON: {e}"))
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &str) -> eyre::Result<Self> {
        let mut patch = Self::default();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(k)?;
            let value = decode(v)?;
            match key.as_str() {
                "setWeight" => patch.set_weight = Some(parse_f32("setWeight", &value)?),
                "offset" => patch.offset = Some(parse_f32("offset", &value)?),
                "scaleMode" => patch.scale_mode = Some(parse_bool("scaleMode", &value)?),
                "grindMode" => patch.grind_mode = Some(parse_bool("grindMode", &value)?),
                "ssid" => patch.ssid = Some(value),
                "password" => patch.password = Some(value),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(patch)
    }

    /// Pick the parser from a `Content-Type` header value.
    pub fn parse(content_type: &str, body: &str) -> eyre::Result<Self> {
        if content_type.starts_with("application/json") {
            Self::from_json(body)
        } else {
            Self::from_form(body)
        }
    }

    /// Both WiFi fields present. A lone ssid or password is ignored.
    pub fn wifi_changed(&self) -> bool {
        self.ssid.is_some() && self.password.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// Form bodies encode spaces as '+'.
fn decode(s: &str) -> eyre::Result<String> {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| eyre::eyre!("malformed form field {s:?}: {e}"))
}
