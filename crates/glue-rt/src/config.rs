use std::str::FromStr;

pub fn env_key(config: &str, field: &str) -> String {
    format!("{}_{}", to_env_key(config), to_env_key(field))
}

/// Reads `GLUE_<FIELD>`-style settings. Unset or blank means `None`.
pub fn env_value(config: &str, field: &str) -> Option<String> {
    let value = std::env::var(env_key(config, field)).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn env_parse<T: FromStr>(config: &str, field: &str) -> Result<Option<T>, String> {
    let Some(raw) = env_value(config, field) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| format!("invalid value for {}: {raw}", env_key(config, field)))
}

fn to_env_key(name: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
            continue;
        }
        let is_upper = ch.is_ascii_uppercase();
        if is_upper && prev_lower {
            out.push('_');
        }
        out.push(ch.to_ascii_uppercase());
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
    }
    out
}
