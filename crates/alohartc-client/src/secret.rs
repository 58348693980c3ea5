//! Secret reference resolver for the auth token.
//!
//! `[auth] token` in `config.toml` may reference a secret stored outside
//! the file:
//!
//! - `pass::path/in/store` runs `pass show path/in/store`, first line wins
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is the token itself

/// Resolves a value that may contain a secret reference prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else {
        Ok(value.to_string())
    }
}

/// Resolves an auth token reference and checks the result with
/// [`validate_token`].
pub fn resolve_token(value: &str) -> Result<String, String> {
    let token = resolve(value)?;
    validate_token(&token).map(str::to_string)
}

/// Checks that a token fits in one `auth-token` frame body. A single
/// trailing line break (as left by `echo` into an env var) is dropped.
pub fn validate_token(token: &str) -> Result<&str, String> {
    let token = token
        .strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(token);
    if token.is_empty() {
        return Err("auth token is empty".to_string());
    }
    if token.contains(['\n', '\r']) {
        return Err("auth token spans several lines".to_string());
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("auth token contains whitespace".to_string());
    }
    Ok(token)
}

/// Runs `pass show <path>` and returns the first line of stdout.
fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`pass show {}` produced no token", path))
}

fn resolve_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
}
