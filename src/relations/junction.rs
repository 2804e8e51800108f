//! Junction-table statement builders
//!
//! MANY_TO_MANY reads and writes go through the adapter's raw statement
//! methods. The builders here produce the three statement shapes the engine
//! emits, with every dynamic value bound as a parameter.

use serde_json::Value;

use crate::filter::Filter;
use crate::sql::SqlStatement;

/// Everything needed to address one junction-mediated relation
#[derive(Debug, Clone)]
pub struct JunctionRef {
    /// Junction table name
    pub table: String,
    /// Junction column referencing the owner
    pub owner_key: String,
    /// Junction column referencing the target
    pub target_key: String,
}

/// Read target records joined through the junction table:
///
/// `SELECT b.<fields> FROM <junction> AS a, <target_table> AS b
///  WHERE a.<target_key> = b.<target_pk> AND a.<owner_key> = $1
///  [AND <extra>] [ORDER BY ...] [LIMIT n]`
#[allow(clippy::too_many_arguments)]
pub fn select_related(
    junction: &JunctionRef,
    target_table: &str,
    target_pk: &str,
    join_value: &Value,
    fields: &str,
    extra_condition: Option<&str>,
    order: Option<&str>,
    limit: Option<u64>,
) -> SqlStatement {
    let mut stmt = SqlStatement::new();
    let field_list = qualify_fields(fields, "b");
    stmt.push(&format!(
        "SELECT {field_list} FROM {} AS a, {target_table} AS b WHERE a.{} = b.{target_pk} AND a.{} = ",
        junction.table, junction.target_key, junction.owner_key
    ));
    stmt.push_bound(join_value.clone());
    if let Some(extra) = extra_condition {
        stmt.push(&format!(" AND {extra}"));
    }
    if let Some(order) = order {
        stmt.push(&format!(" ORDER BY {order}"));
    }
    if let Some(limit) = limit {
        stmt.push(&format!(" LIMIT {limit}"));
    }
    stmt
}

/// Bulk-insert junction rows pairing the owner's primary key with each
/// target primary key, via a select-join rather than per-row inserts:
///
/// `INSERT INTO <junction> (<owner_key>, <target_key>)
///  SELECT a.<owner_pk>, b.<target_pk> FROM <owner_table> AS a, <target_table> AS b
///  WHERE a.<owner_pk> = $1 AND b.<target_pk> IN ($2, ...)`
#[allow(clippy::too_many_arguments)]
pub fn insert_pairs(
    junction: &JunctionRef,
    owner_table: &str,
    owner_pk: &str,
    target_table: &str,
    target_pk: &str,
    owner_value: &Value,
    target_ids: &[Value],
) -> SqlStatement {
    let mut stmt = SqlStatement::new();
    stmt.push(&format!(
        "INSERT INTO {} ({}, {}) SELECT a.{owner_pk}, b.{target_pk} FROM {owner_table} AS a, {target_table} AS b WHERE a.{owner_pk} = ",
        junction.table, junction.owner_key, junction.target_key
    ));
    stmt.push_bound(owner_value.clone());
    stmt.push(&format!(" AND b.{target_pk} IN ("));
    for (index, id) in target_ids.iter().enumerate() {
        if index > 0 {
            stmt.push(", ");
        }
        stmt.push_bound(id.clone());
    }
    stmt.push(")");
    stmt
}

/// Delete junction rows matching the join condition:
/// `DELETE FROM <junction> WHERE <filter>`
pub fn delete_where(junction_table: &str, filter: &Filter) -> SqlStatement {
    let mut stmt = SqlStatement::new();
    stmt.push(&format!("DELETE FROM {junction_table} WHERE "));
    let clause = filter.render(&mut stmt);
    stmt.push(&clause);
    stmt
}

/// Qualify a `*` or comma-separated field list with a table alias
fn qualify_fields(fields: &str, alias: &str) -> String {
    if fields.trim() == "*" {
        return format!("{alias}.*");
    }
    fields
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| format!("{alias}.{field}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn junction() -> JunctionRef {
        JunctionRef {
            table: "app_order_tag".to_string(),
            owner_key: "order_id".to_string(),
            target_key: "tag_id".to_string(),
        }
    }

    #[test]
    fn test_select_related_shape() {
        let stmt = select_related(
            &junction(),
            "app_tag",
            "id",
            &json!(7),
            "*",
            None,
            None,
            None,
        );
        assert_eq!(
            stmt.sql(),
            "SELECT b.* FROM app_order_tag AS a, app_tag AS b \
             WHERE a.tag_id = b.id AND a.order_id = $1"
        );
        assert_eq!(stmt.params(), &[json!(7)]);
    }

    #[test]
    fn test_select_related_with_refinements() {
        let stmt = select_related(
            &junction(),
            "app_tag",
            "id",
            &json!(7),
            "id, label",
            Some("visible = 1"),
            Some("label DESC"),
            Some(5),
        );
        assert_eq!(
            stmt.sql(),
            "SELECT b.id, b.label FROM app_order_tag AS a, app_tag AS b \
             WHERE a.tag_id = b.id AND a.order_id = $1 \
             AND visible = 1 ORDER BY label DESC LIMIT 5"
        );
    }

    #[test]
    fn test_insert_pairs_shape() {
        let stmt = insert_pairs(
            &junction(),
            "app_order",
            "id",
            "app_tag",
            "id",
            &json!(1),
            &[json!(10), json!(11)],
        );
        assert_eq!(
            stmt.sql(),
            "INSERT INTO app_order_tag (order_id, tag_id) \
             SELECT a.id, b.id FROM app_order AS a, app_tag AS b \
             WHERE a.id = $1 AND b.id IN ($2, $3)"
        );
        assert_eq!(stmt.params(), &[json!(1), json!(10), json!(11)]);
    }

    #[test]
    fn test_delete_where_shape() {
        let stmt = delete_where("app_order_tag", &Filter::eq("order_id", json!(1)));
        assert_eq!(stmt.sql(), "DELETE FROM app_order_tag WHERE order_id = $1");
        assert_eq!(stmt.params(), &[json!(1)]);
    }
}
