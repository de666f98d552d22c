//! Schema resolution: CSV header against table columns, and the generated
//! INSERT statement.

use std::collections::HashMap;
use std::path::Path;

use crate::config::{LoadOptions, PlaceholderStyle, Platform};
use crate::csvio::CsvFileReader;
use crate::driver::DbConnection;
use crate::value::SqlType;

use super::LoadError;

/// One projected column: where it lives in the table and which CSV field
/// feeds it.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub db_name: String,
    pub sql_type: SqlType,
    pub type_name: String,
    pub size: u32,
    pub csv_index: usize,
}

/// The resolved projection plus the INSERT text to prepare.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub sql: String,
    pub columns: Vec<ColumnPlan>,
    pub csv_headers: Option<Vec<String>>,
}

/// Resolve the CSV header against table metadata and build the INSERT.
///
/// Header names map through `column_name_map` case-insensitively; names that
/// match no table column are dropped under auto-skip, fatal otherwise.
pub fn build_insert_plan(
    conn: &mut dyn DbConnection,
    table: &str,
    csv_path: &Path,
    opts: &LoadOptions,
    platform: Platform,
) -> Result<InsertPlan, LoadError> {
    let db_columns = conn.table_columns(table, opts.column_info_sql.as_deref())?;
    let by_upper: HashMap<String, usize> = db_columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.to_uppercase(), i))
        .collect();

    // CSV name -> canonical table name, canonicalised through metadata case.
    let mut name_map: HashMap<String, String> = HashMap::new();
    for (csv_name, db_name) in &opts.column_name_map {
        let canonical = by_upper
            .get(&db_name.to_uppercase())
            .map(|&i| db_columns[i].name.clone())
            .unwrap_or_else(|| db_name.clone());
        name_map.insert(csv_name.trim().to_uppercase(), canonical);
    }

    let mut reader = CsvFileReader::open(
        csv_path,
        &opts.dialect,
        opts.skip_rows,
        opts.encoding.as_deref(),
    )?;
    let first = reader
        .read_next()?
        .filter(|r| !r.is_empty())
        .ok_or(LoadError::EmptyHeader)?;

    let (headers, valid_count, csv_headers) = if opts.has_header {
        let count = first.len();
        (first.clone(), count, Some(first))
    } else {
        // Headerless input maps table columns positionally.
        let names: Vec<String> = db_columns.iter().map(|c| c.name.clone()).collect();
        if names.is_empty() {
            return Err(LoadError::SchemaMismatch(
                "no header row and no table columns found".to_string(),
            ));
        }
        let count = names.len().min(first.len());
        (names, count, None)
    };

    let mut columns = Vec::new();
    let mut column_sql = String::new();
    for (i, header) in headers.iter().take(valid_count).enumerate() {
        let csv_name = header.trim();
        let db_name = name_map
            .get(&csv_name.to_uppercase())
            .cloned()
            .unwrap_or_else(|| csv_name.to_string());
        if opts.skip_columns.contains(&db_name.to_uppercase()) {
            continue;
        }

        let info = by_upper.get(&db_name.to_uppercase()).map(|&i| &db_columns[i]);
        let (name, sql_type, type_name, size) = match info {
            Some(column) => (
                column.name.clone(),
                column.sql_type,
                column.type_name.clone(),
                column.size,
            ),
            None => {
                if !db_columns.is_empty() {
                    if opts.skip_columns.auto_enabled() {
                        continue;
                    }
                    return Err(LoadError::SchemaMismatch(format!(
                        "Target column `{}` does not match any table column",
                        db_name
                    )));
                }
                (db_name.clone(), SqlType::Other, String::new(), 0)
            }
        };

        let quoted = platform.quote_ident(&name);
        column_sql.push_str("    ");
        column_sql.push_str(if columns.is_empty() { " " } else { "," });
        column_sql.push_str(&quoted);
        if !type_name.is_empty() {
            column_sql.push_str("  -- ");
            column_sql.push_str(&type_name);
        }
        column_sql.push('\n');

        columns.push(ColumnPlan {
            db_name: name,
            sql_type,
            type_name,
            size,
            csv_index: i,
        });
    }

    if columns.is_empty() {
        return Err(LoadError::SchemaMismatch(
            "no CSV columns map onto the target table".to_string(),
        ));
    }

    let mut sql = format!("INSERT INTO {} (\n{}) VALUES (\n", table, column_sql);
    for i in 0..columns.len() {
        if i > 0 {
            sql.push_str(",\n");
        }
        match opts.placeholder {
            PlaceholderStyle::Question => sql.push_str("    ?"),
            PlaceholderStyle::Numbered => sql.push_str(&format!("    :{}", i + 1)),
        }
    }
    sql.push_str("\n)");

    Ok(InsertPlan {
        sql,
        columns,
        csv_headers,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::SkipColumns;
    use crate::driver::fake::FakeConnection;
    use crate::driver::DbColumn;

    fn table_columns() -> Vec<DbColumn> {
        vec![
            DbColumn {
                name: "id".to_string(),
                sql_type: SqlType::Integer,
                type_name: "INTEGER".to_string(),
                size: 0,
            },
            DbColumn {
                name: "amount".to_string(),
                sql_type: SqlType::Decimal,
                type_name: "DECIMAL(10,2)".to_string(),
                size: 10,
            },
        ]
    }

    fn csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn header_maps_case_insensitively() {
        let mut conn = FakeConnection::new(table_columns());
        let f = csv("ID,Amount\n1,2\n");
        let plan = build_insert_plan(
            &mut conn,
            "t",
            f.path(),
            &LoadOptions::default(),
            Platform::Postgres,
        )
        .unwrap();
        assert_eq!(plan.columns.len(), 2);
        assert_eq!(plan.columns[0].db_name, "id");
        assert_eq!(plan.columns[1].sql_type, SqlType::Decimal);
        assert!(plan.sql.contains("INSERT INTO t"));
        assert!(plan.sql.contains("\"id\""));
        assert!(plan.sql.contains("?"));
        assert_eq!(
            plan.csv_headers.as_deref(),
            Some(&["ID".to_string(), "Amount".to_string()][..])
        );
    }

    #[test]
    fn unmatched_columns_auto_skip_or_fail() {
        let f = csv("id,amount,extra\n1,2,3\n");

        let mut conn = FakeConnection::new(table_columns());
        let plan = build_insert_plan(
            &mut conn,
            "t",
            f.path(),
            &LoadOptions::default(),
            Platform::Postgres,
        )
        .unwrap();
        assert_eq!(plan.columns.len(), 2);

        let mut strict = LoadOptions::default();
        strict.skip_columns = SkipColumns::Off;
        let mut conn = FakeConnection::new(table_columns());
        let err = build_insert_plan(&mut conn, "t", f.path(), &strict, Platform::Postgres)
            .unwrap_err();
        assert!(err.to_string().contains("`extra`"));
    }

    #[test]
    fn column_name_map_redirects() {
        let f = csv("ident,total\n1,2\n");
        let mut opts = LoadOptions::default();
        opts.column_name_map
            .insert("ident".to_string(), "ID".to_string());
        opts.column_name_map
            .insert("total".to_string(), "AMOUNT".to_string());
        let mut conn = FakeConnection::new(table_columns());
        let plan = build_insert_plan(&mut conn, "t", f.path(), &opts, Platform::Postgres).unwrap();
        assert_eq!(plan.columns[0].db_name, "id");
        assert_eq!(plan.columns[1].db_name, "amount");
    }

    #[test]
    fn numbered_placeholders() {
        let f = csv("id,amount\n1,2\n");
        let mut opts = LoadOptions::default();
        opts.placeholder = PlaceholderStyle::Numbered;
        let mut conn = FakeConnection::new(table_columns());
        let plan = build_insert_plan(&mut conn, "t", f.path(), &opts, Platform::Oracle).unwrap();
        assert!(plan.sql.contains(":1"));
        assert!(plan.sql.contains(":2"));
    }

    #[test]
    fn headerless_input_maps_positionally() {
        let f = csv("1,2\n3,4\n");
        let mut opts = LoadOptions::default();
        opts.has_header = false;
        let mut conn = FakeConnection::new(table_columns());
        let plan = build_insert_plan(&mut conn, "t", f.path(), &opts, Platform::Postgres).unwrap();
        assert_eq!(plan.columns.len(), 2);
        assert!(plan.csv_headers.is_none());
        assert_eq!(plan.columns[0].csv_index, 0);
    }

    #[test]
    fn explicit_skip_list() {
        let f = csv("id,amount\n1,2\n");
        let mut opts = LoadOptions::default();
        opts.skip_columns = SkipColumns::List(vec!["AMOUNT".to_string()]);
        let mut conn = FakeConnection::new(table_columns());
        let plan = build_insert_plan(&mut conn, "t", f.path(), &opts, Platform::Postgres).unwrap();
        assert_eq!(plan.columns.len(), 1);
        assert_eq!(plan.columns[0].db_name, "id");
    }
}
