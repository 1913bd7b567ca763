//! SQLite table rebuild.
//!
//! SQLite cannot add a column carrying a key, a uniqueness constraint, an
//! expression default, or NOT NULL without a default, and its in-place
//! `DROP COLUMN` rejects indexed or key columns. Those changes go through a
//! rebuild:
//!
//! 1. capture the stored `CREATE TABLE` text, the table's explicit indexes
//!    and triggers, and every view or foreign trigger that names the table
//! 2. create `_<table>_shadow` from that text with the change applied
//! 3. copy every row across
//! 4. drop the dependents, drop the original and rename the shadow into place
//! 5. re-create the indexes, triggers and dependents
//!
//! Working from the stored text keeps CHECK constraints, collations and
//! generated columns exactly as declared.
//!
//! The swap runs inside the caller's transaction if one is open, otherwise in
//! its own. Dropping a table that other tables reference would fire their
//! `ON DELETE` actions, so foreign key enforcement must be off for the swap;
//! integrity is verified with the engine's foreign key check before commit.

use tracing::{debug, info, warn};

use ctxdb_schema::dialect::{MigrationDialect, SqliteDialect};
use ctxdb_schema::schema::ColumnSchema;

use crate::adapter::{with_transaction, ConnectionAdapter};
use crate::error::{Result, StoreError};

/// Defers enforcement to commit inside an open transaction.
const DEFER_FOREIGN_KEYS: &str = "defer_foreign_keys";

/// Structural change applied by a rebuild.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Change<'c> {
    AddColumn(&'c ColumnSchema),
    DropColumn(&'c str),
}

impl Change<'_> {
    const fn dropped(&self) -> Option<&str> {
        match self {
            Self::DropColumn(name) => Some(*name),
            Self::AddColumn(_) => None,
        }
    }
}

/// Rebuilds `table` with `change` applied.
pub(crate) async fn rebuild_table(
    adapter: &dyn ConnectionAdapter,
    table: &str,
    change: Change<'_>,
) -> Result<()> {
    if adapter.capabilities().add_column_with_constraints {
        return Err(StoreError::Config(format!(
            "table rebuild is not available on {}",
            adapter.engine()
        )));
    }

    if adapter.in_transaction().await {
        if let Some(setting) = enforcement_setting(adapter) {
            if setting_enabled(adapter, setting).await? {
                let referencing = referencing_tables(adapter, table).await?;
                if !referencing.is_empty() {
                    return Err(StoreError::Config(format!(
                        "cannot rebuild '{table}' inside a transaction with foreign keys enforced; \
                         it is referenced by {}",
                        referencing.join(", ")
                    )));
                }
                adapter
                    .execute(
                        &adapter.dialect().set_setting_sql(DEFER_FOREIGN_KEYS, "ON"),
                        &[],
                    )
                    .await?;
            }
        }
        return swap(adapter, table, change).await;
    }

    let suspended = suspend_foreign_keys(adapter).await?;
    let result = with_transaction(adapter, |tx| {
        Box::pin(async move {
            swap(tx, table, change).await?;
            check_foreign_keys(tx).await
        })
    })
    .await;
    if suspended {
        let restored = restore_foreign_keys(adapter).await;
        if result.is_ok() {
            restored?;
        } else if let Err(err) = restored {
            warn!(error = %err, "could not re-enable foreign keys after failed rebuild");
        }
    }
    result
}

/// The setting that toggles foreign key enforcement, on engines that
/// rebuild tables. Other engines never need it switched.
fn enforcement_setting(adapter: &dyn ConnectionAdapter) -> Option<&'static str> {
    let caps = adapter.capabilities();
    if caps.add_column_with_constraints {
        None
    } else {
        caps.foreign_key_setting
    }
}

/// Turns foreign key enforcement off on engines that rebuild tables.
///
/// Returns `true` if enforcement was on and has been switched off. Must be
/// called outside a transaction; SQLite ignores the pragma inside one.
pub(crate) async fn suspend_foreign_keys(adapter: &dyn ConnectionAdapter) -> Result<bool> {
    let Some(setting) = enforcement_setting(adapter) else {
        return Ok(false);
    };
    if !setting_enabled(adapter, setting).await? {
        return Ok(false);
    }
    adapter
        .execute(&adapter.dialect().set_setting_sql(setting, "OFF"), &[])
        .await?;
    debug!(setting, "foreign key enforcement suspended");
    Ok(true)
}

/// Re-enables foreign key enforcement after [`suspend_foreign_keys`].
pub(crate) async fn restore_foreign_keys(adapter: &dyn ConnectionAdapter) -> Result<()> {
    let Some(setting) = enforcement_setting(adapter) else {
        return Ok(());
    };
    adapter
        .execute(&adapter.dialect().set_setting_sql(setting, "ON"), &[])
        .await?;
    debug!(setting, "foreign key enforcement restored");
    Ok(())
}

/// Fails with [`StoreError::ForeignKeyViolation`] if any row references a
/// missing parent row.
pub(crate) async fn check_foreign_keys(adapter: &dyn ConnectionAdapter) -> Result<()> {
    let Some(sql) = adapter.dialect().foreign_key_check_sql() else {
        return Ok(());
    };
    let rows = adapter.query(sql, &[]).await?;
    if let Some(first) = rows.first() {
        let table = first.get_string("table")?;
        let parent = first.get_string("parent")?;
        let count = rows
            .iter()
            .filter(|row| row.get_string("table").is_ok_and(|t| t == table))
            .count();
        return Err(StoreError::ForeignKeyViolation {
            table,
            parent,
            count,
        });
    }
    Ok(())
}

async fn setting_enabled(adapter: &dyn ConnectionAdapter, setting: &str) -> Result<bool> {
    Ok(adapter
        .query_one(&adapter.dialect().show_setting_sql(setting), &[])
        .await?
        .map(|row| row.get_bool(setting))
        .transpose()?
        .unwrap_or(false))
}

async fn referencing_tables(adapter: &dyn ConnectionAdapter, table: &str) -> Result<Vec<String>> {
    let rows = adapter
        .query(
            "SELECT DISTINCT m.name AS name FROM sqlite_master m \
             JOIN pragma_foreign_key_list(m.name) f \
             WHERE m.type = 'table' AND m.name <> ? COLLATE NOCASE \
             AND f.\"table\" = ? COLLATE NOCASE",
            &[table.into(), table.into()],
        )
        .await?;
    rows.iter().map(|row| row.get_string("name")).collect()
}

async fn swap(adapter: &dyn ConnectionAdapter, table: &str, change: Change<'_>) -> Result<()> {
    let dialect = SqliteDialect::new();
    let shape = TableShape::load(adapter, table).await?;
    let table = shape.name.as_str();
    let shadow = format!("_{table}_shadow");
    let intent = |step: &str| format!("{step} while rebuilding {table}");

    let create_sql = shape.render(&dialect, &shadow, change)?;
    let copy_columns = shape.copy_columns(change);

    adapter
        .execute(&dialect.drop_table_sql(&shadow, true), &[])
        .await
        .map_err(|e| e.with_intent(intent("clear a stale shadow table")))?;
    adapter
        .execute(&create_sql, &[])
        .await
        .map_err(|e| e.with_intent(intent("create the shadow table")))?;
    let copied = adapter
        .execute(&dialect.copy_rows_sql(table, &shadow, &copy_columns), &[])
        .await
        .map_err(|e| e.with_intent(intent("copy rows")))?;

    // The rename re-validates every view and trigger in the schema, so
    // anything naming the original has to be gone before it is.
    for dependent in shape.dependents.iter().rev() {
        adapter
            .execute(&dependent.drop_sql(&dialect), &[])
            .await
            .map_err(|e| {
                e.with_intent(intent(&format!(
                    "drop dependent {} {}",
                    dependent.kind.label(),
                    dependent.name
                )))
            })?;
    }
    adapter
        .execute(&dialect.drop_table_sql(table, false), &[])
        .await
        .map_err(|e| e.with_intent(intent("drop the original table")))?;
    adapter
        .execute(&dialect.rename_table_sql(&shadow, table), &[])
        .await
        .map_err(|e| e.with_intent(intent("rename the shadow table")))?;

    for index in &shape.indexes {
        if change
            .dropped()
            .is_some_and(|dropped| index.columns.iter().any(|c| c.eq_ignore_ascii_case(dropped)))
        {
            info!(table, index = %index.name, "index dropped with its column");
            continue;
        }
        adapter
            .execute(&index.sql, &[])
            .await
            .map_err(|e| e.with_intent(intent(&format!("re-create index {}", index.name))))?;
    }
    for trigger in &shape.triggers {
        adapter
            .execute(trigger, &[])
            .await
            .map_err(|e| e.with_intent(intent("re-create a trigger")))?;
    }
    for dependent in &shape.dependents {
        adapter.execute(&dependent.sql, &[]).await.map_err(|e| {
            e.with_intent(intent(&format!(
                "re-create {} {}",
                dependent.kind.label(),
                dependent.name
            )))
        })?;
    }

    info!(
        table,
        shadow = %shadow,
        rows = copied,
        dependents = shape.dependents.len(),
        "table rebuilt"
    );
    Ok(())
}

#[derive(Debug)]
struct ShapeColumn {
    name: String,
    pk_position: i64,
}

#[derive(Debug)]
struct SavedIndex {
    name: String,
    sql: String,
    columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependentKind {
    View,
    Trigger,
}

impl DependentKind {
    const fn label(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Trigger => "trigger",
        }
    }
}

/// A view, or a trigger on another table or view, whose body names the
/// rebuilt table directly or through another dependent view.
#[derive(Debug)]
struct Dependent {
    kind: DependentKind,
    name: String,
    sql: String,
}

impl Dependent {
    fn drop_sql(&self, dialect: &SqliteDialect) -> String {
        match self.kind {
            DependentKind::View => dialect.drop_view_sql(&self.name, true),
            DependentKind::Trigger => {
                format!("DROP TRIGGER IF EXISTS {}", dialect.quote_identifier(&self.name))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

impl ConstraintKind {
    const fn label(self) -> &'static str {
        match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::Check => "check",
        }
    }
}

/// One comma-separated entry of a `CREATE TABLE` body, kept verbatim.
#[derive(Debug, PartialEq, Eq)]
enum Definition {
    Column {
        name: String,
        sql: String,
    },
    Constraint {
        kind: ConstraintKind,
        /// Columns listed by a key, unique or foreign key constraint.
        columns: Vec<String>,
        sql: String,
    },
}

impl Definition {
    fn parse(sql: &str) -> Self {
        let (first, quoted, rest) = leading_word(sql);
        let (keyword, rest) = if quoted {
            (None, rest)
        } else if first.eq_ignore_ascii_case("CONSTRAINT") {
            let (_, _, after_name) = leading_word(rest);
            let (keyword, _, rest) = leading_word(after_name);
            (Some(keyword), rest)
        } else {
            (Some(first.clone()), rest)
        };

        let kind = match keyword.map(|k| k.to_ascii_uppercase()).as_deref() {
            Some("PRIMARY") => Some(ConstraintKind::PrimaryKey),
            Some("UNIQUE") => Some(ConstraintKind::Unique),
            Some("FOREIGN") => Some(ConstraintKind::ForeignKey),
            Some("CHECK") => Some(ConstraintKind::Check),
            _ => None,
        };

        match kind {
            Some(kind) => {
                let columns = if kind == ConstraintKind::Check {
                    Vec::new()
                } else {
                    split_parenthesized(rest)
                        .map(|(items, _)| items.iter().map(|item| leading_word(item).0).collect())
                        .unwrap_or_default()
                };
                Self::Constraint {
                    kind,
                    columns,
                    sql: sql.to_string(),
                }
            }
            None => Self::Column {
                name: first,
                sql: sql.to_string(),
            },
        }
    }

    fn sql(&self) -> &str {
        match self {
            Self::Column { sql, .. } | Self::Constraint { sql, .. } => sql,
        }
    }
}

/// Everything about a table the rebuild has to carry across.
#[derive(Debug)]
struct TableShape {
    /// Name as stored in the catalog.
    name: String,
    definitions: Vec<Definition>,
    /// Table options after the body, such as `WITHOUT ROWID` or `STRICT`.
    options: String,
    /// Stored columns; generated columns are recomputed, never copied.
    columns: Vec<ShapeColumn>,
    indexes: Vec<SavedIndex>,
    triggers: Vec<String>,
    dependents: Vec<Dependent>,
}

impl TableShape {
    async fn load(adapter: &dyn ConnectionAdapter, table: &str) -> Result<Self> {
        let row = adapter
            .query_one(
                "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
                &[table.into()],
            )
            .await?
            .ok_or_else(|| StoreError::Config(format!("cannot rebuild missing table '{table}'")))?;
        let name = row.get_string("name")?;
        let create_sql = strip_comments(&row.get_opt_string("sql")?.unwrap_or_default());
        let (items, options) = split_parenthesized(&create_sql).ok_or_else(|| {
            StoreError::Config(format!("cannot read the stored definition of '{name}'"))
        })?;
        let definitions: Vec<Definition> = items.iter().map(|d| Definition::parse(d)).collect();
        let options = options.trim().to_string();

        let mut columns = Vec::new();
        for row in adapter
            .query(
                "SELECT name, pk FROM pragma_table_xinfo(?) WHERE hidden = 0 ORDER BY cid",
                &[name.as_str().into()],
            )
            .await?
        {
            columns.push(ShapeColumn {
                name: row.get_string("name")?,
                pk_position: row.get_i64("pk")?,
            });
        }

        let mut indexes = Vec::new();
        for row in adapter
            .query(
                "SELECT name, sql FROM sqlite_master \
                 WHERE type = 'index' AND tbl_name = ? COLLATE NOCASE AND sql IS NOT NULL \
                 ORDER BY name",
                &[name.as_str().into()],
            )
            .await?
        {
            let index = row.get_string("name")?;
            let columns = index_columns(adapter, &index).await?;
            indexes.push(SavedIndex {
                name: index,
                sql: row.get_string("sql")?,
                columns,
            });
        }

        let mut triggers = Vec::new();
        for row in adapter
            .query(
                "SELECT sql FROM sqlite_master \
                 WHERE type = 'trigger' AND tbl_name = ? COLLATE NOCASE ORDER BY name",
                &[name.as_str().into()],
            )
            .await?
        {
            triggers.push(row.get_string("sql")?);
        }

        let dependents = dependents(adapter, &name).await?;

        debug!(
            table = %name,
            definitions = definitions.len(),
            indexes = indexes.len(),
            triggers = triggers.len(),
            dependents = dependents.len(),
            "table shape captured"
        );

        Ok(Self {
            name,
            definitions,
            options,
            columns,
            indexes,
            triggers,
            dependents,
        })
    }

    fn primary_key(&self) -> Vec<&str> {
        let mut pk: Vec<&ShapeColumn> = self.columns.iter().filter(|c| c.pk_position > 0).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk.into_iter().map(|c| c.name.as_str()).collect()
    }

    /// Stored columns present both before and after the change.
    fn copy_columns(&self, change: Change<'_>) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !change.dropped().is_some_and(|d| c.name.eq_ignore_ascii_case(d)))
            .map(|c| c.name.clone())
            .collect()
    }

    fn render(&self, dialect: &SqliteDialect, shadow: &str, change: Change<'_>) -> Result<String> {
        let pk = self.primary_key();
        let mut defs: Vec<String> = Vec::with_capacity(self.definitions.len() + 2);

        match change {
            Change::DropColumn(column) => {
                if pk.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    return Err(StoreError::Config(format!(
                        "cannot drop primary key column '{column}' from '{}'",
                        self.name
                    )));
                }
                let mut found = false;
                for def in &self.definitions {
                    match def {
                        Definition::Column { name, .. } if name.eq_ignore_ascii_case(column) => {
                            found = true;
                        }
                        Definition::Column { sql, .. } => defs.push(sql.clone()),
                        Definition::Constraint { kind, columns, sql } => {
                            let involved = match kind {
                                ConstraintKind::Check => mentions(sql, column),
                                _ => columns.iter().any(|c| c.eq_ignore_ascii_case(column)),
                            };
                            if !involved {
                                defs.push(sql.clone());
                                continue;
                            }
                            let single = columns.len() == 1;
                            if single
                                && matches!(kind, ConstraintKind::Unique | ConstraintKind::ForeignKey)
                            {
                                info!(
                                    table = %self.name,
                                    column,
                                    constraint = kind.label(),
                                    "constraint dropped with its column"
                                );
                                continue;
                            }
                            return Err(StoreError::Config(format!(
                                "cannot drop '{column}' from '{}': it is used by a {} constraint",
                                self.name,
                                kind.label()
                            )));
                        }
                    }
                }
                if !found {
                    return Err(StoreError::Config(format!(
                        "'{column}' is not a stored column of '{}'",
                        self.name
                    )));
                }
            }
            Change::AddColumn(column) => {
                if column.primary_key && !pk.is_empty() {
                    return Err(StoreError::Config(format!(
                        "'{}' already has a primary key; cannot add '{}' as one",
                        self.name, column.name
                    )));
                }
                defs.extend(self.definitions.iter().map(|d| d.sql().to_string()));
                // Column definitions must precede table constraints.
                let insert_at = self
                    .definitions
                    .iter()
                    .rposition(|d| matches!(d, Definition::Column { .. }))
                    .map_or(0, |i| i + 1);
                defs.insert(insert_at, dialect.column_definition(column));
                if let Some(fk) = &column.references {
                    defs.push(format!(
                        "CONSTRAINT {} FOREIGN KEY ({}) {}",
                        dialect.quote_identifier(&dialect.foreign_key_name(&self.name, &column.name)),
                        dialect.quote_identifier(&column.name),
                        dialect.references_clause(fk)
                    ));
                }
            }
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            dialect.quote_identifier(shadow),
            defs.join(",\n  ")
        );
        if !self.options.is_empty() {
            sql.push(' ');
            sql.push_str(&self.options);
        }
        Ok(sql)
    }
}

async fn index_columns(adapter: &dyn ConnectionAdapter, index: &str) -> Result<Vec<String>> {
    let rows = adapter
        .query(
            "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
            &[index.into()],
        )
        .await?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        // Expression index entries have no column name.
        if let Some(name) = row.get_opt_string("name")? {
            columns.push(name);
        }
    }
    Ok(columns)
}

/// Views naming `table`, views naming those views, and triggers on other
/// objects naming any of them, in catalog order.
async fn dependents(adapter: &dyn ConnectionAdapter, table: &str) -> Result<Vec<Dependent>> {
    let mut objects = Vec::new();
    for row in adapter
        .query(
            "SELECT type, name, tbl_name, sql FROM sqlite_master \
             WHERE type IN ('view', 'trigger') AND sql IS NOT NULL ORDER BY rowid",
            &[],
        )
        .await?
    {
        let kind = if row.get_string("type")? == "view" {
            DependentKind::View
        } else {
            DependentKind::Trigger
        };
        objects.push((
            Dependent {
                kind,
                name: row.get_string("name")?,
                sql: row.get_string("sql")?,
            },
            row.get_string("tbl_name")?,
        ));
    }

    let mut names = vec![table.to_string()];
    let mut picked = vec![false; objects.len()];
    loop {
        let mut grew = false;
        for (i, (object, _)) in objects.iter().enumerate() {
            if picked[i] || object.kind != DependentKind::View {
                continue;
            }
            if names.iter().any(|n| mentions(&object.sql, n)) {
                picked[i] = true;
                names.push(object.name.clone());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    for (i, (object, owner)) in objects.iter().enumerate() {
        // The table's own triggers go with DROP TABLE and are restored separately.
        if object.kind != DependentKind::Trigger || owner.eq_ignore_ascii_case(table) {
            continue;
        }
        if names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(owner) || mentions(&object.sql, n))
        {
            picked[i] = true;
        }
    }

    Ok(objects
        .into_iter()
        .zip(picked)
        .filter_map(|((object, _), picked)| picked.then_some(object))
        .collect())
}

/// Whether `sql` contains `name` as a whole identifier, ignoring case.
fn mentions(sql: &str, name: &str) -> bool {
    let haystack = sql.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    if needle.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
    haystack.match_indices(&needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Replaces `--` and `/* */` comments outside quotes with whitespace.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                for n in chars.by_ref() {
                    out.push(n);
                    if n == close {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Calls `visit` with the byte offset, character and parenthesis depth of
/// every character outside quoted text.
fn for_each_unquoted(sql: &str, mut visit: impl FnMut(usize, char, usize)) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        if let Some(close) = quote {
            if c == close {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            '(' => {
                visit(i, c, depth);
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                visit(i, c, depth);
            }
            _ => visit(i, c, depth),
        }
    }
}

/// Splits the first top-level parenthesized list of `sql` at its top-level
/// commas. Returns the trimmed items and the text after the list.
fn split_parenthesized(sql: &str) -> Option<(Vec<String>, &str)> {
    let mut open = None;
    let mut close = None;
    let mut commas = Vec::new();
    for_each_unquoted(sql, |i, c, depth| {
        if close.is_some() {
            return;
        }
        match (c, depth) {
            ('(', 0) if open.is_none() => open = Some(i),
            (')', 0) if open.is_some() => close = Some(i),
            (',', 1) if open.is_some() => commas.push(i),
            _ => {}
        }
    });
    let (open, close) = (open?, close?);

    let mut items = Vec::new();
    let mut start = open + 1;
    for end in commas.into_iter().chain(std::iter::once(close)) {
        let item = sql[start..end].trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
        start = end + 1;
    }
    Some((items, &sql[close + 1..]))
}

/// First word of `sql`, unquoted. Returns the word, whether it was quoted,
/// and the remaining text.
fn leading_word(sql: &str) -> (String, bool, &str) {
    let sql = sql.trim_start();
    match sql.chars().next() {
        Some(open @ ('"' | '`' | '[' | '\'')) => {
            let close = if open == '[' { ']' } else { open };
            let body = &sql[open.len_utf8()..];
            let mut word = String::new();
            let mut chars = body.char_indices().peekable();
            while let Some((i, c)) = chars.next() {
                if c == close {
                    // A doubled quote stands for itself.
                    if close != ']' && chars.peek().is_some_and(|&(_, n)| n == close) {
                        word.push(c);
                        chars.next();
                        continue;
                    }
                    return (word, true, &body[i + c.len_utf8()..]);
                }
                word.push(c);
            }
            (word, true, "")
        }
        Some(_) => {
            let end = sql
                .find(|c: char| c.is_whitespace() || c == '(' || c == ',')
                .unwrap_or(sql.len());
            (sql[..end].to_string(), false, &sql[end..])
        }
        None => (String::new(), false, ""),
    }
}
