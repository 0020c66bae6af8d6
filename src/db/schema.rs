use super::pool::quote_ident;

/// SQL column type used by the application tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Text,
}

impl ColumnType {
    /// Returns the Postgres type name
    pub fn to_postgres(self) -> &'static str {
        match self {
            ColumnType::Serial => "SERIAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A column in a table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
}

impl Column {
    fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            primary_key: false,
            not_null: false,
            unique: false,
        }
    }

    fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(self.name), self.col_type.to_postgres());
        // PRIMARY KEY already implies NOT NULL and UNIQUE
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else {
            if self.not_null {
                def.push_str(" NOT NULL");
            }
            if self.unique {
                def.push_str(" UNIQUE");
            }
        }
        def
    }
}

/// A fixed table the bootstrap creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: Vec<Column>,
}

impl TableDef {
    /// Generate an idempotent DDL statement for this table.
    ///
    /// `qualified_name` is the already-quoted target, see `Pool::qualified_table_name`.
    pub fn create_if_not_exists_ddl(&self, qualified_name: &str) -> String {
        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n", qualified_name);

        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("  {}", col.definition()))
            .collect();

        ddl.push_str(&column_defs.join(",\n"));
        ddl.push_str("\n);");

        ddl
    }
}

/// The application tables, in creation order
pub fn app_tables() -> Vec<TableDef> {
    use ColumnType::*;

    vec![
        TableDef {
            name: "users",
            columns: vec![
                Column::new("id", Serial).primary_key(),
                Column::new("name", Text).not_null(),
                Column::new("email", Text).not_null().unique(),
            ],
        },
        TableDef {
            name: "phones",
            columns: vec![
                Column::new("id", Serial).primary_key(),
                Column::new("name", Text).not_null(),
                Column::new("brand", Text).not_null(),
                Column::new("type", Text).not_null(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_tables_order() {
        let names: Vec<&str> = app_tables().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["users", "phones"]);
    }

    #[test]
    fn test_users_ddl() {
        let tables = app_tables();
        let ddl = tables[0].create_if_not_exists_ddl("\"public\".\"users\"");

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"public\".\"users\" (\n  \"id\" SERIAL PRIMARY KEY,\n  \"name\" TEXT NOT NULL,\n  \"email\" TEXT NOT NULL UNIQUE\n);"
        );
    }

    #[test]
    fn test_phones_ddl() {
        let tables = app_tables();
        let ddl = tables[1].create_if_not_exists_ddl("\"phones\"");

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"phones\" ("));
        assert!(ddl.contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(ddl.contains("\"brand\" TEXT NOT NULL"));
        // "type" is a keyword in some contexts, quoting keeps it a plain column
        assert!(ddl.contains("\"type\" TEXT NOT NULL"));
        assert!(!ddl.contains("UNIQUE"));
        assert!(ddl.ends_with("\n);"));
    }

    #[test]
    fn test_primary_key_skips_redundant_flags() {
        let col = Column::new("id", ColumnType::Serial)
            .primary_key()
            .not_null()
            .unique();
        assert_eq!(col.definition(), "\"id\" SERIAL PRIMARY KEY");
    }
}
