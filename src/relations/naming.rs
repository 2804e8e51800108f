//! Naming defaults for relation configuration
//!
//! Pure functions, no I/O. These supply the documented defaults for foreign
//! keys, junction-table names, and self-reference parent keys when a
//! relation definition omits them.

/// Parent key used for self-referential relations in place of a
/// `<entity>_id` foreign key.
pub const DEFAULT_PARENT_KEY: &str = "parent_id";

/// True when a relation targets its own owner entity type
pub fn is_self_reference(owner: &str, target: &str) -> bool {
    owner.eq_ignore_ascii_case(target)
}

/// Default foreign key on the related record referencing the owner.
///
/// `lowercase(owner) + "_id"`, except self-references which use
/// [`DEFAULT_PARENT_KEY`].
pub fn default_foreign_key(owner: &str, target: &str) -> String {
    if is_self_reference(owner, target) {
        DEFAULT_PARENT_KEY.to_string()
    } else {
        format!("{}_id", owner.to_lowercase())
    }
}

/// Default foreign key held on the owner for a many-to-one relation,
/// derived from the target type's name.
pub fn default_belongs_to_key(owner: &str, target: &str) -> String {
    if is_self_reference(owner, target) {
        DEFAULT_PARENT_KEY.to_string()
    } else {
        format!("{}_id", target.to_lowercase())
    }
}

/// Default junction-table column referencing the target side
pub fn default_relation_foreign_key(target: &str) -> String {
    format!("{}_id", target.to_lowercase())
}

/// Default junction table name: `lowercase(prefix + owner + "_" + target)`
pub fn default_junction_table(owner: &str, target: &str, prefix: &str) -> String {
    format!("{}{}_{}", prefix, owner, target).to_lowercase()
}

/// Expand `__NAME__` placeholder tokens in an explicit junction-table
/// template with `prefix + lowercase(name)`. Text outside tokens is kept
/// as-is; unterminated or empty tokens are left untouched.
pub fn expand_junction_template(template: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("__") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let token_end = after.find("__").filter(|&end| {
            end > 0
                && after[..end]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
        match token_end {
            Some(end) => {
                out.push_str(prefix);
                out.push_str(&after[..end].to_lowercase());
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("__");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Convert a CamelCase entity name to snake_case, the convention used for
/// default table names.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out.trim_matches('_').to_string()
}
