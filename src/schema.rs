//! Declarative user-table schema.
//!
//! The YAML file is read into the raw `StoreConfig` model and then validated
//! once into a `SchemaDescriptor`. Both store variants and the token engine
//! work only with the validated form.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};
use tracing::debug;
use uuid::Uuid;

use crate::error::SchemaError;

/// Column whose value is hashed at creation and compared at authentication.
pub const PASSWORD_COLUMN: &str = "password";
/// Fallback username column when no column is flagged `primary_key`.
pub const USERNAME_COLUMN: &str = "username";
/// Column whose claim is reported as the role on verification.
pub const ROLE_COLUMN: &str = "role";
/// Claims owned by the token engine; no column may produce them.
pub const RESERVED_CLAIMS: [&str; 3] = ["iss", "exp", "refreshed_at"];

/// A user row keyed by column name.
pub type UserRecord = BTreeMap<String, String>;

/// Top-level store config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub version: u32,
    pub table: TableConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub auto_create: bool,
    pub columns: BTreeMap<String, ColumnConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_claim: Option<String>,
}

// `default: 0` and `default: false` are as common as quoted strings.
fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    use serde_yaml::Value;

    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => serde_json::to_string(&other).map(Some).map_err(D::Error::custom),
    }
}

impl StoreConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let cfg: StoreConfig = serde_yaml::from_str(yaml)?;
        if cfg.version != 1 {
            return Err(SchemaError::UnsupportedVersion(cfg.version));
        }
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn into_schema(self) -> Result<SchemaDescriptor, SchemaError> {
        SchemaDescriptor::validate(self.table)
    }
}

/// Storage types a column may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
    Uuid,
    Jsonb,
    Timestamp,
}

impl ColumnType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "text" => Some(ColumnType::Text),
            "int" => Some(ColumnType::Integer),
            "bool" => Some(ColumnType::Boolean),
            "uuid" => Some(ColumnType::Uuid),
            "jsonb" => Some(ColumnType::Jsonb),
            "timestamp" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "int",
            ColumnType::Boolean => "bool",
            ColumnType::Uuid => "uuid",
            ColumnType::Jsonb => "jsonb",
            ColumnType::Timestamp => "timestamp",
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Uuid => "UUID",
            ColumnType::Jsonb => "JSONB",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Whether `value` is a valid textual rendering of this type.
    pub fn accepts(self, value: &str) -> bool {
        match self {
            ColumnType::Text => true,
            ColumnType::Integer => value.parse::<i32>().is_ok(),
            ColumnType::Boolean => {
                value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
            }
            ColumnType::Uuid => Uuid::parse_str(value).is_ok(),
            ColumnType::Jsonb => serde_json::from_str::<serde_json::Value>(value).is_ok(),
            ColumnType::Timestamp => OffsetDateTime::parse(value, &Rfc3339).is_ok(),
        }
    }

    /// Stored form of `value`, or `None` if the type rejects it. Timestamps
    /// are rewritten to UTC with microsecond precision, as Postgres keeps them.
    pub fn canonical(self, value: &str) -> Option<String> {
        match self {
            ColumnType::Timestamp => {
                format_timestamp(OffsetDateTime::parse(value, &Rfc3339).ok()?)
            }
            _ => self.accepts(value).then(|| value.to_string()),
        }
    }
}

/// RFC 3339 in UTC, truncated to microseconds.
pub(crate) fn format_timestamp(ts: OffsetDateTime) -> Option<String> {
    let ts = ts.to_offset(UtcOffset::UTC);
    let ts = ts.replace_nanosecond(ts.nanosecond() / 1_000 * 1_000).ok()?;
    ts.format(&Rfc3339).ok()
}

/// A validated column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub unique: bool,
    pub required: bool,
    pub hidden: bool,
    pub default: Option<String>,
    pub jwt_claim: Option<String>,
}

impl ColumnSpec {
    pub fn is_password(&self) -> bool {
        self.name == PASSWORD_COLUMN
    }

    /// SQL column definition used for table auto-creation.
    pub fn definition(&self) -> String {
        let mut col = format!("{} {}", quote_ident(&self.name), self.column_type.sql_type());
        if self.required {
            col.push_str(" NOT NULL");
        }
        if self.unique {
            col.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            col.push_str(&format!(" DEFAULT {}", quote_literal(default)));
        }
        col
    }
}

/// Validated user-table schema.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    table: String,
    auto_create: bool,
    columns: Vec<ColumnSpec>,
    username: usize,
}

impl SchemaDescriptor {
    pub fn validate(table: TableConfig) -> Result<Self, SchemaError> {
        if !is_identifier(&table.name) {
            return Err(SchemaError::InvalidIdentifier(table.name));
        }

        let mut columns = Vec::with_capacity(table.columns.len());
        for (name, cfg) in table.columns {
            if !is_identifier(&name) {
                return Err(SchemaError::InvalidIdentifier(name));
            }
            let column_type = ColumnType::from_keyword(&cfg.type_name).ok_or_else(|| {
                SchemaError::UnsupportedType {
                    column: name.clone(),
                    type_name: cfg.type_name.clone(),
                }
            })?;

            let spec = ColumnSpec {
                name,
                column_type,
                primary_key: cfg.primary_key,
                unique: cfg.unique,
                required: cfg.required,
                hidden: cfg.hidden,
                default: cfg.default,
                jwt_claim: cfg.jwt_claim,
            };

            if let Some(default) = &spec.default {
                if !spec.is_password() && !spec.column_type.accepts(default) {
                    return Err(SchemaError::InvalidDefault { column: spec.name });
                }
            }

            columns.push(spec);
        }

        let mut primary = columns.iter().enumerate().filter(|(_, c)| c.primary_key);
        let username = match (primary.next(), primary.next()) {
            (Some(_), Some(_)) => return Err(SchemaError::MultiplePrimaryKeys),
            (Some((idx, _)), None) => idx,
            (None, _) => columns
                .iter()
                .position(|c| c.name == USERNAME_COLUMN)
                .ok_or(SchemaError::NoUsernameColumn)?,
        };

        let schema = Self {
            table: table.name,
            auto_create: table.auto_create,
            columns,
            username,
        };

        let mut claims = HashSet::new();
        for col in &schema.columns {
            let Some(claim) = schema.claim_name(col) else {
                continue;
            };
            if RESERVED_CLAIMS.contains(&claim) {
                return Err(SchemaError::ReservedClaim {
                    column: col.name.clone(),
                    claim: claim.to_string(),
                });
            }
            if !claims.insert(claim) {
                return Err(SchemaError::DuplicateClaim(claim.to_string()));
            }
        }

        debug!(
            table = %schema.table,
            columns = schema.columns.len(),
            username = %schema.username_column().name,
            "store schema validated"
        );
        Ok(schema)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn auto_create(&self) -> bool {
        self.auto_create
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column identifying a user.
    pub fn username_column(&self) -> &ColumnSpec {
        &self.columns[self.username]
    }

    /// Name under which `col` appears in an access token, if at all.
    ///
    /// An explicit `jwt_claim` wins even for hidden columns and visible
    /// columns fall back to their own name. The username and role columns
    /// are emitted even when hidden, as `username` and `role` unless they
    /// name a claim. The password never appears.
    pub fn claim_name<'a>(&self, col: &'a ColumnSpec) -> Option<&'a str> {
        if col.is_password() {
            return None;
        }
        if let Some(claim) = &col.jwt_claim {
            return Some(claim.as_str());
        }
        if !col.hidden {
            Some(col.name.as_str())
        } else if col.name == self.username_column().name {
            Some(USERNAME_COLUMN)
        } else if col.name == ROLE_COLUMN {
            Some(ROLE_COLUMN)
        } else {
            None
        }
    }

    pub fn password_column(&self) -> Option<&ColumnSpec> {
        self.column(PASSWORD_COLUMN)
    }

    /// Drops hidden columns and the password hash from a full record.
    pub fn visible(&self, mut record: UserRecord) -> UserRecord {
        for col in &self.columns {
            if col.hidden || col.is_password() {
                record.remove(&col.name);
            }
        }
        record
    }

    /// Maps a full record onto access-token claims.
    pub fn claims_for(&self, record: &UserRecord) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .filter_map(|col| {
                let claim = self.claim_name(col)?;
                let value = record.get(&col.name)?;
                Some((claim.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn column_definitions(&self) -> Vec<String> {
        self.columns.iter().map(ColumnSpec::definition).collect()
    }

    pub fn primary_key_clause(&self) -> Option<String> {
        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_ident(&c.name))
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(format!("PRIMARY KEY ({})", keys.join(", ")))
        }
    }

    pub fn create_table_sql(&self) -> String {
        let mut parts = self.column_definitions();
        parts.extend(self.primary_key_clause());
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.table),
            parts.join(", ")
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
pub(crate) const SAMPLE_YAML: &str = r#"
version: 1
table:
  name: users
  auto_create: true
  columns:
    username:
      type: text
      primary_key: true
      required: true
    password:
      type: text
      required: true
      hidden: true
    role:
      type: text
      default: user
      jwt_claim: role
    email:
      type: text
      unique: true
    account_id:
      type: uuid
      hidden: true
      jwt_claim: sub
    notes:
      type: text
      hidden: true
    age:
      type: int
"#;

#[cfg(test)]
pub(crate) fn sample_schema() -> SchemaDescriptor {
    StoreConfig::from_yaml(SAMPLE_YAML)
        .and_then(StoreConfig::into_schema)
        .expect("sample schema is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(columns: &[(&str, ColumnConfig)]) -> TableConfig {
        TableConfig {
            name: "users".into(),
            auto_create: false,
            columns: columns
                .iter()
                .map(|(n, c)| (n.to_string(), c.clone()))
                .collect(),
        }
    }

    fn text() -> ColumnConfig {
        ColumnConfig {
            type_name: "text".into(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_sample_config() {
        let schema = sample_schema();
        assert_eq!(schema.table(), "users");
        assert!(schema.auto_create());
        assert_eq!(schema.columns().len(), 7);
        assert_eq!(schema.username_column().name, "username");
        assert_eq!(schema.column("role").unwrap().default.as_deref(), Some("user"));
        assert_eq!(schema.column("age").unwrap().column_type, ColumnType::Integer);
    }

    #[test]
    fn rejects_other_versions() {
        let yaml = SAMPLE_YAML.replace("version: 1", "version: 2");
        let err = StoreConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut col = text();
        col.type_name = "varchar".into();
        let err = SchemaDescriptor::validate(table_with(&[("username", col)])).unwrap_err();
        match err {
            SchemaError::UnsupportedType { column, type_name } => {
                assert_eq!(column, "username");
                assert_eq!(type_name, "varchar");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_two_primary_keys() {
        let mut a = text();
        a.primary_key = true;
        let b = a.clone();
        let err = SchemaDescriptor::validate(table_with(&[("username", a), ("email", b)]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MultiplePrimaryKeys));
    }

    #[test]
    fn falls_back_to_username_column() {
        let schema =
            SchemaDescriptor::validate(table_with(&[("username", text()), ("email", text())]))
                .unwrap();
        assert_eq!(schema.username_column().name, "username");
        assert_eq!(schema.primary_key_clause(), None);

        let err = SchemaDescriptor::validate(table_with(&[("email", text())])).unwrap_err();
        assert!(matches!(err, SchemaError::NoUsernameColumn));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let err = SchemaDescriptor::validate(table_with(&[("user\"name", text())])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIdentifier(_)));

        let mut table = table_with(&[("username", text())]);
        table.name = "users; drop table x".into();
        let err = SchemaDescriptor::validate(table).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_reserved_and_duplicate_claims() {
        let err = SchemaDescriptor::validate(table_with(&[("username", text()), ("exp", text())]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReservedClaim { .. }));

        let mut alias = text();
        alias.jwt_claim = Some("username".into());
        let err = SchemaDescriptor::validate(table_with(&[("username", text()), ("login", alias)]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateClaim(c) if c == "username"));
    }

    #[test]
    fn rejects_default_of_wrong_type() {
        let mut age = ColumnConfig {
            type_name: "int".into(),
            ..Default::default()
        };
        age.default = Some("old".into());
        let err = SchemaDescriptor::validate(table_with(&[("username", text()), ("age", age)]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { column } if column == "age"));
    }

    #[test]
    fn non_string_yaml_defaults_become_text() {
        let yaml = r#"
version: 1
table:
  name: users
  columns:
    username: { type: text, primary_key: true }
    active: { type: bool, default: true }
    score: { type: int, default: 0 }
"#;
        let schema = StoreConfig::from_yaml(yaml).unwrap().into_schema().unwrap();
        assert_eq!(schema.column("active").unwrap().default.as_deref(), Some("true"));
        assert_eq!(schema.column("score").unwrap().default.as_deref(), Some("0"));
    }

    #[test]
    fn type_acceptance() {
        assert!(ColumnType::Integer.accepts("42"));
        assert!(!ColumnType::Integer.accepts("4.2"));
        assert!(ColumnType::Boolean.accepts("TRUE"));
        assert!(!ColumnType::Boolean.accepts("yes"));
        assert!(ColumnType::Uuid.accepts("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!ColumnType::Uuid.accepts("nope"));
        assert!(ColumnType::Jsonb.accepts(r#"{"a":1}"#));
        assert!(!ColumnType::Jsonb.accepts("{a"));
        assert!(ColumnType::Timestamp.accepts("2024-05-01T10:00:00Z"));
        assert!(!ColumnType::Timestamp.accepts("yesterday"));
    }

    #[test]
    fn timestamps_are_stored_in_utc() {
        assert_eq!(
            ColumnType::Timestamp.canonical("2024-05-01T12:00:00+02:00").as_deref(),
            Some("2024-05-01T10:00:00Z")
        );
        assert_eq!(
            ColumnType::Timestamp.canonical("2024-05-01T10:00:00.123456789Z"),
            ColumnType::Timestamp.canonical("2024-05-01T10:00:00.123456Z")
        );
        assert_eq!(ColumnType::Timestamp.canonical("yesterday"), None);
        assert_eq!(ColumnType::Text.canonical(" as is ").as_deref(), Some(" as is "));
        assert_eq!(ColumnType::Integer.canonical("x"), None);
    }

    #[test]
    fn renders_ddl() {
        let schema = sample_schema();
        let defs = schema.column_definitions();
        assert!(defs.contains(&r#""username" TEXT NOT NULL"#.to_string()));
        assert!(defs.contains(&r#""email" TEXT UNIQUE"#.to_string()));
        assert!(defs.contains(&r#""role" TEXT DEFAULT 'user'"#.to_string()));
        assert!(defs.contains(&r#""account_id" UUID"#.to_string()));
        assert_eq!(
            schema.primary_key_clause().as_deref(),
            Some(r#"PRIMARY KEY ("username")"#)
        );
        let sql = schema.create_table_sql();
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "users" ("#));
        assert!(sql.ends_with(r#"PRIMARY KEY ("username"))"#));
    }

    #[test]
    fn quotes_default_literals() {
        let mut motto = text();
        motto.default = Some("it's".into());
        let schema =
            SchemaDescriptor::validate(table_with(&[("username", text()), ("motto", motto)]))
                .unwrap();
        assert_eq!(
            schema.column("motto").unwrap().definition(),
            r#""motto" TEXT DEFAULT 'it''s'"#
        );
    }

    #[test]
    fn hidden_and_claim_mapping_are_independent() {
        let schema = sample_schema();
        let record: UserRecord = [
            ("username", "alice"),
            ("password", "$argon2id$hash"),
            ("role", "user"),
            ("email", "alice@example.com"),
            ("account_id", "67e55044-10b1-426f-9247-bb680e5fe0c8"),
            ("notes", "vip"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let visible = schema.visible(record.clone());
        assert!(visible.contains_key("username"));
        assert!(visible.contains_key("email"));
        assert!(!visible.contains_key("password"));
        assert!(!visible.contains_key("notes"));
        assert!(!visible.contains_key("account_id"));

        let claims = schema.claims_for(&record);
        assert_eq!(claims.get("username").map(String::as_str), Some("alice"));
        assert_eq!(claims.get("role").map(String::as_str), Some("user"));
        assert_eq!(
            claims.get("sub").map(String::as_str),
            Some("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        assert!(!claims.contains_key("password"));
        assert!(!claims.contains_key("notes"));
        assert!(!claims.contains_key("account_id"));
    }

    #[test]
    fn hidden_identity_columns_still_become_claims() {
        let yaml = r#"
version: 1
table:
  name: users
  columns:
    login: { type: text, primary_key: true, required: true, hidden: true }
    password: { type: text, required: true, hidden: true }
    role: { type: text, default: user, hidden: true }
    notes: { type: text, hidden: true }
"#;
        let schema = StoreConfig::from_yaml(yaml).unwrap().into_schema().unwrap();
        let record: UserRecord = [("login", "alice"), ("role", "admin"), ("notes", "x")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let claims = schema.claims_for(&record);
        assert_eq!(claims.get("username").map(String::as_str), Some("alice"));
        assert_eq!(claims.get("role").map(String::as_str), Some("admin"));
        assert_eq!(claims.len(), 2);
        assert!(schema.visible(record).is_empty());
    }

    #[test]
    fn hidden_key_cannot_shadow_a_username_column() {
        let mut login = text();
        login.primary_key = true;
        login.hidden = true;
        let err = SchemaDescriptor::validate(table_with(&[("login", login), ("username", text())]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateClaim(c) if c == "username"));
    }
}
