//! Schema migration units for the application's own migration runner.
//!
//! A unit adds optional columns when absent and drops them on rollback when
//! present, so re-running it against a partially migrated schema is a no-op.
//! Units are materialized as timestamp-prefixed migration files.

use crate::error::{GraftError, Result};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const ID_FORMAT: &str = "%Y_%m_%d_%H%M%S";
const ID_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    UnsignedBigInteger,
    String,
    Text,
    Json,
}

impl FieldType {
    fn builder(self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::UnsignedBigInteger => "unsignedBigInteger",
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl DefaultValue {
    fn render(&self) -> String {
        match self {
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Str(s) => quote(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

/// Any column store a migration action can be evaluated against.
pub trait ColumnSet {
    fn has_column(&self, name: &str) -> bool;
    fn add_column(&mut self, field: &FieldSpec);
    fn drop_column(&mut self, name: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnAction {
    Add(FieldSpec),
    Drop(String),
}

impl ColumnAction {
    /// Applies the guarded action; returns whether the store changed.
    pub fn apply(&self, columns: &mut dyn ColumnSet) -> bool {
        match self {
            ColumnAction::Add(field) => {
                if columns.has_column(&field.name) {
                    return false;
                }
                columns.add_column(field);
                true
            }
            ColumnAction::Drop(name) => {
                if !columns.has_column(name) {
                    return false;
                }
                columns.drop_column(name);
                true
            }
        }
    }

    fn render(&self, table: &str) -> String {
        match self {
            ColumnAction::Add(field) => {
                let mut expr = format!("$table->{}({})", field.ty.builder(), quote(&field.name));
                if field.nullable {
                    expr.push_str("->nullable()");
                }
                if let Some(default) = &field.default {
                    expr.push_str(&format!("->default({})", default.render()));
                }
                format!(
                    "            if (!Schema::hasColumn({}, {})) {{\n                {expr};\n            }}\n",
                    quote(table),
                    quote(&field.name)
                )
            }
            ColumnAction::Drop(name) => format!(
                "            if (Schema::hasColumn({t}, {n})) {{\n                $table->dropColumn({n});\n            }}\n",
                t = quote(table),
                n = quote(name)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationUnit {
    /// `YYYY_MM_DD_HHMMSS`, sorts the same way the runner orders files.
    pub identifier: String,
    /// Stable suffix; a file ending in it means the unit already exists.
    pub slug: String,
    pub table: String,
    pub up: Vec<ColumnAction>,
    pub down: Vec<ColumnAction>,
}

impl MigrationUnit {
    pub fn file_name(&self) -> String {
        format!("{}_{}.php", self.identifier, self.slug)
    }

    pub fn class_name(&self) -> String {
        self.slug
            .split('_')
            .filter(|p| !p.is_empty())
            .map(|p| {
                let mut chars = p.chars();
                match chars.next() {
                    Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }

    pub fn apply_up(&self, columns: &mut dyn ColumnSet) -> usize {
        self.up.iter().filter(|a| a.apply(columns)).count()
    }

    pub fn apply_down(&self, columns: &mut dyn ColumnSet) -> usize {
        self.down.iter().filter(|a| a.apply(columns)).count()
    }

    pub fn render(&self) -> String {
        let body = |actions: &[ColumnAction]| -> String {
            actions.iter().map(|a| a.render(&self.table)).collect()
        };
        format!(
            "<?php\n\
             \n\
             use Illuminate\\Database\\Migrations\\Migration;\n\
             use Illuminate\\Database\\Schema\\Blueprint;\n\
             use Illuminate\\Support\\Facades\\Schema;\n\
             \n\
             class {class} extends Migration\n\
             {{\n\
             \x20   public function up()\n\
             \x20   {{\n\
             \x20       Schema::table({table}, function (Blueprint $table) {{\n\
             {up}\
             \x20       }});\n\
             \x20   }}\n\
             \n\
             \x20   public function down()\n\
             \x20   {{\n\
             \x20       Schema::table({table}, function (Blueprint $table) {{\n\
             {down}\
             \x20       }});\n\
             \x20   }}\n\
             }}\n",
            class = self.class_name(),
            table = quote(&self.table),
            up = body(&self.up),
            down = body(&self.down),
        )
    }
}

pub fn generate(table: &str, slug: &str, fields: &[FieldSpec], now: NaiveDateTime) -> MigrationUnit {
    MigrationUnit {
        identifier: now.format(ID_FORMAT).to_string(),
        slug: slug.to_string(),
        table: table.to_string(),
        up: fields.iter().cloned().map(ColumnAction::Add).collect(),
        // rollback in reverse order of addition
        down: fields
            .iter()
            .rev()
            .map(|f| ColumnAction::Drop(f.name.clone()))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Written(PathBuf),
    AlreadyPresent(PathBuf),
}

/// Migration file in `dir` written for `slug`, if any.
pub fn find_existing(dir: &Path, slug: &str) -> Result<Option<PathBuf>> {
    Ok(scan(dir, slug)?.0)
}

fn scan(dir: &Path, slug: &str) -> Result<(Option<PathBuf>, Vec<String>)> {
    let suffix = format!("_{slug}.php");
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).map_err(|e| GraftError::io(format!("read {}", dir.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| GraftError::io(format!("read {}", dir.display()), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(&suffix) {
            return Ok((Some(entry.path()), names));
        }
        names.push(name);
    }
    Ok((None, names))
}

/// Writes `unit` into `dir` unless a file for its slug already exists.
///
/// The identifier is moved forward past every existing migration prefix so
/// the new file always sorts last.
pub fn materialize(unit: &MigrationUnit, dir: &Path) -> Result<Materialized> {
    let (found, existing) = scan(dir, &unit.slug)?;
    if let Some(path) = found {
        info!(migration = %path.display(), "migration already present");
        return Ok(Materialized::AlreadyPresent(path));
    }

    let identifier = next_identifier(&unit.identifier, &existing)?;
    let path = dir.join(format!("{identifier}_{}.php", unit.slug));
    let rendered = MigrationUnit {
        identifier,
        ..unit.clone()
    }
    .render();
    std::fs::write(&path, rendered)
        .map_err(|e| GraftError::io(format!("write {}", path.display()), e))?;
    info!(migration = %path.display(), "migration written");
    Ok(Materialized::Written(path))
}

fn next_identifier(proposed: &str, existing: &[String]) -> Result<String> {
    let parse = |id: &str| NaiveDateTime::parse_from_str(id, ID_FORMAT).ok();
    let mut at = parse(proposed).ok_or_else(|| {
        GraftError::Config(format!("migration identifier `{proposed}` is not {ID_FORMAT}"))
    })?;

    let newest = existing
        .iter()
        .filter_map(|name| name.get(..ID_LEN))
        .filter_map(parse)
        .max();
    if let Some(newest) = newest {
        if newest >= at {
            at = newest + Duration::seconds(1);
        }
    }
    Ok(at.format(ID_FORMAT).to_string())
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryTable {
        columns: BTreeMap<String, FieldSpec>,
    }

    impl ColumnSet for MemoryTable {
        fn has_column(&self, name: &str) -> bool {
            self.columns.contains_key(name)
        }

        fn add_column(&mut self, field: &FieldSpec) {
            self.columns.insert(field.name.clone(), field.clone());
        }

        fn drop_column(&mut self, name: &str) {
            self.columns.remove(name);
        }
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                name: "protection_enabled".to_string(),
                ty: FieldType::Boolean,
                nullable: false,
                default: Some(DefaultValue::Bool(false)),
            },
            FieldSpec {
                name: "protected_menus".to_string(),
                ty: FieldType::Text,
                nullable: true,
                default: None,
            },
        ]
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn up_twice_leaves_each_field_once() {
        let unit = generate("users", "add_menu_protection_fields", &fields(), at(9, 0, 0));
        let mut table = MemoryTable::default();

        assert_eq!(unit.apply_up(&mut table), 2);
        assert_eq!(unit.apply_up(&mut table), 0);
        assert_eq!(
            table.columns.keys().cloned().collect::<Vec<_>>(),
            vec!["protected_menus".to_string(), "protection_enabled".to_string()]
        );
    }

    #[test]
    fn down_on_absent_fields_is_a_noop() {
        let unit = generate("users", "add_menu_protection_fields", &fields(), at(9, 0, 0));
        let mut table = MemoryTable::default();
        assert_eq!(unit.apply_down(&mut table), 0);

        // a prior partial run left only one of the fields behind
        table.add_column(&fields()[1]);
        assert_eq!(unit.apply_up(&mut table), 1);
        assert_eq!(unit.apply_down(&mut table), 2);
        assert!(table.columns.is_empty());
    }

    #[test]
    fn rendered_unit_guards_every_action() {
        let unit = generate("users", "add_menu_protection_fields", &fields(), at(9, 0, 0));
        let php = unit.render();

        assert!(php.contains("class AddMenuProtectionFields extends Migration"));
        assert!(php.contains(
            "if (!Schema::hasColumn('users', 'protection_enabled')) {\n                $table->boolean('protection_enabled')->default(false);"
        ));
        assert!(php.contains("$table->text('protected_menus')->nullable();"));
        assert!(php.contains(
            "if (Schema::hasColumn('users', 'protected_menus')) {\n                $table->dropColumn('protected_menus');"
        ));
        assert_eq!(php.matches("hasColumn").count(), 4);
        assert_eq!(unit.file_name(), "2026_10_19_090000_add_menu_protection_fields.php");
    }

    #[test]
    fn materialize_is_idempotent_and_sorts_after_existing_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("2026_10_19_090000_create_users.php"), "").unwrap();
        std::fs::write(tmp.path().join("2026_10_19_093000_add_flags.php"), "").unwrap();
        let unit = generate("users", "add_menu_protection_fields", &fields(), at(9, 0, 0));

        let first = materialize(&unit, tmp.path()).unwrap();
        let expected = tmp
            .path()
            .join("2026_10_19_093001_add_menu_protection_fields.php");
        assert_eq!(first, Materialized::Written(expected.clone()));

        let later = generate("users", "add_menu_protection_fields", &fields(), at(12, 0, 0));
        assert_eq!(
            materialize(&later, tmp.path()).unwrap(),
            Materialized::AlreadyPresent(expected)
        );
    }
}
