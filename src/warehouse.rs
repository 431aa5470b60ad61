//! Warehouse access: session trait, row types, and the Snowflake SQL-API
//! client.
//!
//! The connection is opened once at startup and held for the process
//! lifetime. All statements are single read-only queries; there is no
//! pooling, no retry, and no transaction handling.
//!
//! Three interchangeable credential strategies feed one constructor:
//! username/password and external-browser SSO go through the legacy
//! login-request endpoint for a session token, key-pair auth signs an RS256
//! JWT that the SQL API accepts directly.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::Profile;

/// How long a signed key-pair JWT stays valid.
const JWT_LIFETIME_SECS: i64 = 3600;

/// Credential strategy for the warehouse connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Sso,
    #[default]
    Password,
    KeyPair,
}

/// One `SHOW TASKS` result row, column-for-column.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub created_on: String,
    pub name: String,
    pub id: String,
    pub warehouse: Option<String>,
    pub schedule: Option<String>,
    pub state: String,
    pub predecessors: String,
    pub allow_overlap: Option<bool>,
}

/// One task-history result row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run_id: String,
    pub task_name: String,
    pub state: String,
    pub scheduled: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

/// Read-only warehouse session.
pub trait Session {
    /// All tasks in the configured schema.
    fn list_tasks(&mut self) -> Result<Vec<TaskRow>>;

    /// Run history for one task, newest first.
    fn task_history(&mut self, task_name: &str) -> Result<Vec<RunRow>>;

    /// Per-task rows for one run id, ordered by start time.
    fn run_history(&mut self, run_id: &str) -> Result<Vec<RunRow>>;
}

// SHOW TASKS column positions.
const COL_CREATED_ON: usize = 0;
const COL_NAME: usize = 1;
const COL_ID: usize = 2;
const COL_WAREHOUSE: usize = 7;
const COL_SCHEDULE: usize = 8;
const COL_PREDECESSORS: usize = 9;
const COL_STATE: usize = 10;
const COL_ALLOW_OVERLAP: usize = 13;

type ResultRow = Vec<Option<String>>;

enum Credentials {
    /// Session token from the login-request endpoint.
    SessionToken(String),
    /// Self-signed key-pair JWT.
    KeyPairJwt(String),
}

/// Blocking Snowflake SQL-API session.
pub struct SnowflakeSession {
    http: HttpClient,
    base_url: String,
    credentials: Credentials,
    database: String,
    schema: String,
    role: Option<String>,
    warehouse: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    data: LoginRequestData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginRequestData<'a> {
    account_name: &'a str,
    login_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authenticator: Option<&'a str>,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<LoginResponseData>,
}

#[derive(Deserialize)]
struct LoginResponseData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "ssoUrl")]
    sso_url: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
}

#[derive(Deserialize)]
struct StatementResponse {
    #[serde(default)]
    data: Option<Vec<ResultRow>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct JwtClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Open a warehouse session with the profile's credential strategy. Every
/// arm yields the same session capability.
pub fn connect(profile: &Profile) -> Result<SnowflakeSession> {
    let database = profile
        .database
        .clone()
        .context("profile is missing a database")?;
    let schema = profile
        .schema
        .clone()
        .context("profile is missing a schema")?;

    let http = HttpClient::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;
    let base_url = format!("https://{}.snowflakecomputing.com", profile.account);

    let credentials = match profile.authenticator {
        AuthMethod::Password => {
            let password = std::env::var("SNOWFLAKE_PASSWORD")
                .context("SNOWFLAKE_PASSWORD is not set in the environment")?;
            let token = login_request(
                &http,
                &base_url,
                &profile.account,
                &profile.user,
                Some(&password),
                None,
            )?;
            Credentials::SessionToken(token)
        }
        AuthMethod::Sso => {
            let token = login_request(
                &http,
                &base_url,
                &profile.account,
                &profile.user,
                None,
                Some("EXTERNALBROWSER"),
            )?;
            Credentials::SessionToken(token)
        }
        AuthMethod::KeyPair => Credentials::KeyPairJwt(sign_keypair_jwt(profile)?),
    };

    Ok(SnowflakeSession {
        http,
        base_url,
        credentials,
        database,
        schema,
        role: profile.role.clone(),
        warehouse: profile.warehouse.clone(),
    })
}

fn login_request(
    http: &HttpClient,
    base_url: &str,
    account: &str,
    user: &str,
    password: Option<&str>,
    authenticator: Option<&str>,
) -> Result<String> {
    let body = LoginRequest {
        data: LoginRequestData {
            account_name: account,
            login_name: user,
            password,
            authenticator,
        },
    };
    let resp: LoginResponse = http
        .post(format!("{}/session/v1/login-request", base_url))
        .json(&body)
        .send()
        .context("Login request failed")?
        .json()
        .context("Malformed login response")?;

    if !resp.success {
        bail!(
            "Warehouse login rejected: {}",
            resp.message.unwrap_or_else(|| "no message".to_string())
        );
    }
    let data = resp.data.context("Login response carried no data")?;
    match (data.token, data.sso_url) {
        (Some(token), _) => Ok(token),
        // The IdP wants a browser round-trip; this tool is non-interactive
        // past startup, so surface the URL instead of spawning one.
        (None, Some(url)) => bail!("SSO login requires completing the flow at {}", url),
        (None, None) => bail!("Login response carried no session token"),
    }
}

fn sign_keypair_jwt(profile: &Profile) -> Result<String> {
    let key_path = match &profile.private_key_path {
        Some(path) => path.clone(),
        None => default_key_path().context("Could not locate the home directory")?,
    };
    let pem = fs::read(&key_path)
        .with_context(|| format!("Failed to read private key {:?}", key_path))?;
    let key = EncodingKey::from_rsa_pem(&pem)
        .with_context(|| format!("Invalid RSA private key {:?}", key_path))?;

    let qualified_user = format!(
        "{}.{}",
        profile.account.to_uppercase(),
        profile.user.to_uppercase()
    );
    let iss = match &profile.public_key_fp {
        Some(fp) => format!("{}.{}", qualified_user, fp),
        None => qualified_user.clone(),
    };
    let iat = Utc::now().timestamp();
    let claims = JwtClaims {
        iss,
        sub: qualified_user,
        iat,
        exp: iat + JWT_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .context("Failed to sign key-pair JWT")
}

fn default_key_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa_snowflake"))
}

impl SnowflakeSession {
    fn execute(&mut self, statement: &str) -> Result<Vec<ResultRow>> {
        let body = StatementRequest {
            statement,
            timeout: 60,
            database: &self.database,
            schema: &self.schema,
            role: self.role.as_deref(),
            warehouse: self.warehouse.as_deref(),
        };
        let request = self
            .http
            .post(format!("{}/api/v2/statements", self.base_url))
            .header("User-Agent", concat!("taskview/", env!("CARGO_PKG_VERSION")))
            .header("Accept", "application/json");
        let request = match &self.credentials {
            Credentials::SessionToken(token) => request.header(
                "Authorization",
                format!("Snowflake Token=\"{}\"", token),
            ),
            Credentials::KeyPairJwt(jwt) => request
                .bearer_auth(jwt)
                .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT"),
        };
        let resp = request
            .json(&body)
            .send()
            .with_context(|| format!("Query failed: {}", statement))?;

        let status = resp.status();
        let parsed: StatementResponse = resp
            .json()
            .with_context(|| format!("Malformed query response for: {}", statement))?;
        if !status.is_success() {
            bail!(
                "Query rejected ({}): {}",
                status,
                parsed.message.unwrap_or_else(|| "no message".to_string())
            );
        }
        Ok(parsed.data.unwrap_or_default())
    }
}

impl Session for SnowflakeSession {
    fn list_tasks(&mut self) -> Result<Vec<TaskRow>> {
        let statement = format!("show tasks in schema {}.{}", self.database, self.schema);
        let rows = self.execute(&statement)?;
        Ok(rows.iter().map(|row| task_row(row)).collect())
    }

    fn task_history(&mut self, task_name: &str) -> Result<Vec<RunRow>> {
        let statement = format!(
            "select name, run_id, state, scheduled_time, query_start_time, completed_time \
             from table(information_schema.task_history(task_name => '{}')) \
             order by scheduled_time desc",
            escape_literal(task_name)
        );
        let rows = self.execute(&statement)?;
        Ok(rows.iter().map(|row| run_row(row)).collect())
    }

    fn run_history(&mut self, run_id: &str) -> Result<Vec<RunRow>> {
        validate_run_id(run_id)?;
        let statement = format!(
            "select name, run_id, state, scheduled_time, query_start_time, completed_time \
             from table(information_schema.task_history()) \
             where run_id = {} order by query_start_time",
            run_id
        );
        let rows = self.execute(&statement)?;
        Ok(rows.iter().map(|row| run_row(row)).collect())
    }
}

/// Double embedded single quotes for a SQL string literal.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Run ids are numeric; anything else never reaches a statement.
fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() || !run_id.chars().all(|c| c.is_ascii_digit()) {
        bail!("Invalid run id '{}': expected a number", run_id);
    }
    Ok(())
}

fn cell(row: &ResultRow, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|c| c.as_deref())
}

fn opt_cell(row: &ResultRow, idx: usize) -> Option<String> {
    cell(row, idx)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn task_row(row: &ResultRow) -> TaskRow {
    TaskRow {
        created_on: cell(row, COL_CREATED_ON).unwrap_or_default().to_string(),
        name: cell(row, COL_NAME).unwrap_or_default().to_string(),
        id: cell(row, COL_ID).unwrap_or_default().to_string(),
        warehouse: opt_cell(row, COL_WAREHOUSE),
        schedule: opt_cell(row, COL_SCHEDULE),
        state: cell(row, COL_STATE).unwrap_or_default().to_string(),
        predecessors: cell(row, COL_PREDECESSORS).unwrap_or("[]").to_string(),
        allow_overlap: opt_cell(row, COL_ALLOW_OVERLAP).and_then(|s| s.parse().ok()),
    }
}

fn run_row(row: &ResultRow) -> RunRow {
    RunRow {
        task_name: cell(row, 0).unwrap_or_default().to_string(),
        run_id: cell(row, 1).unwrap_or_default().to_string(),
        state: cell(row, 2).unwrap_or_default().to_string(),
        scheduled: cell(row, 3).and_then(parse_timestamp),
        started: cell(row, 4).and_then(parse_timestamp),
        completed: cell(row, 5).and_then(parse_timestamp),
    }
}

/// Parse a SQL-API timestamp cell.
///
/// The API serializes timestamp columns as epoch seconds with a fractional
/// part; ISO text shows up from casts. An unparsable cell is treated as
/// not-yet-known rather than failing the whole fetch.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some((secs, frac)) = raw.split_once('.') {
        if !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(secs) = secs.parse::<i64>() {
                let padded = format!("{:0<9}", frac);
                if let Ok(nanos) = padded[..9].parse::<u32>() {
                    return Utc.timestamp_opt(secs, nanos).single();
                }
            }
        }
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_epoch_with_fraction() {
        let ts = parse_timestamp("1700000000.300000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 300);
    }

    #[test]
    fn test_parse_timestamp_bare_epoch() {
        let ts = parse_timestamp("1700000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_timestamp_iso_text() {
        let ts = parse_timestamp("2024-01-15 10:30:00.250").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(parse_timestamp("2024-01-15T10:30:00+00:00").is_some());
    }

    #[test]
    fn test_parse_timestamp_unknown() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("1700000000000").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("1; drop table t").is_err());
        assert!(validate_run_id("abc").is_err());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'HARE"), "O''HARE");
        assert_eq!(escape_literal("PLAIN"), "PLAIN");
    }

    #[test]
    fn test_task_row_projection() {
        let row: ResultRow = vec![
            Some("1700000000.000000000".to_string()), // created_on
            Some("LOAD".to_string()),                 // name
            Some("01a2".to_string()),                 // id
            Some("DB".to_string()),
            Some("PUBLIC".to_string()),
            Some("OWNER".to_string()),
            None,                                     // comment
            Some("COMPUTE_WH".to_string()),           // warehouse
            None,                                     // schedule
            Some("[]".to_string()),                   // predecessors
            Some("started".to_string()),              // state
            Some("select 1".to_string()),             // definition
            None,                                     // condition
            Some("true".to_string()),                 // allow_overlapping_execution
        ];
        let task = task_row(&row);
        assert_eq!(task.name, "LOAD");
        assert_eq!(task.warehouse, Some("COMPUTE_WH".to_string()));
        assert_eq!(task.schedule, None);
        assert_eq!(task.predecessors, "[]");
        assert_eq!(task.allow_overlap, Some(true));
    }

    #[test]
    fn test_run_row_projection_with_missing_suffix() {
        let row: ResultRow = vec![
            Some("TRANSFORM".to_string()),
            Some("1700000000000".to_string()),
            Some("EXECUTING".to_string()),
            Some("1700000000.000000000".to_string()),
            Some("1700000000.300000000".to_string()),
            None,
        ];
        let run = run_row(&row);
        assert_eq!(run.task_name, "TRANSFORM");
        assert_eq!(run.state, "EXECUTING");
        assert!(run.scheduled.is_some());
        assert!(run.started.is_some());
        assert!(run.completed.is_none());
    }
}
