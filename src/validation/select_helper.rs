// AST helpers over sqlparser for clause-level field extraction.
//
// Parsing the statement and walking the AST avoids the false positives a
// string scan would produce for identifiers inside literals or comments.

use std::collections::HashSet;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, OrderByKind,
    Select, SelectItem, SetExpr, Statement,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};

/// Reserved prefix for internal fields (partition dates etc.); these are
/// filter-only and never surfaced in a select list
pub const SYS_FIELD_PREFIX: &str = "sys_";

/// Aggregation functions recognized when collecting whole aggregate
/// expressions from HAVING/ORDER BY clauses
const AGG_FUNCTIONS: &[&str] = &["sum", "avg", "count", "max", "min"];

pub fn is_sys_field(name: &str) -> bool {
    name.starts_with(SYS_FIELD_PREFIX)
}

/// Parse SQL expected to contain exactly one query statement
pub fn parse_query(sql: &str) -> Result<Statement, ParserError> {
    let dialect = PostgreSqlDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)?;
    if statements.len() != 1 {
        return Err(ParserError::ParserError(format!(
            "expected a single statement, found {}",
            statements.len()
        )));
    }
    let statement = statements.remove(0);
    match statement {
        Statement::Query(_) => Ok(statement),
        other => Err(ParserError::ParserError(format!(
            "expected a query statement, found: {}",
            other
        ))),
    }
}

/// The SELECT body of a query statement, if it is a plain select
pub fn statement_select(statement: &Statement) -> Option<&Select> {
    match statement {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => Some(select),
            _ => None,
        },
        _ => None,
    }
}

pub fn statement_select_mut(statement: &mut Statement) -> Option<&mut Select> {
    match statement {
        Statement::Query(query) => match query.body.as_mut() {
            SetExpr::Select(select) => Some(select),
            _ => None,
        },
        _ => None,
    }
}

/// ORDER BY expressions of a query statement
pub fn order_by_exprs(statement: &Statement) -> Vec<Expr> {
    let mut exprs = Vec::new();
    if let Statement::Query(query) = statement {
        if let Some(order_by) = &query.order_by {
            if let OrderByKind::Expressions(order_exprs) = &order_by.kind {
                for order_expr in order_exprs {
                    exprs.push(order_expr.expr.clone());
                }
            }
        }
    }
    exprs
}

/// GROUP BY expressions of a select body
pub fn group_by_exprs(select: &Select) -> Vec<Expr> {
    match &select.group_by {
        GroupByExpr::Expressions(exprs, _) => exprs.clone(),
        _ => Vec::new(),
    }
}

pub fn has_group_by(select: &Select) -> bool {
    !group_by_exprs(select).is_empty()
}

/// Serialized projection expressions plus their aliases, used to decide
/// whether a referenced field is already selected
pub fn select_field_strings(select: &Select) -> Vec<String> {
    let mut fields = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => fields.push(expr.to_string()),
            SelectItem::ExprWithAlias { expr, alias } => {
                fields.push(expr.to_string());
                fields.push(alias.value.clone());
            }
            _ => {}
        }
    }
    fields
}

pub fn has_wildcard(select: &Select) -> bool {
    select.projection.iter().any(|item| {
        matches!(
            item,
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _)
        )
    })
}

/// Column identifiers referenced by an expression, in order of first
/// appearance; descends into function arguments
pub fn expr_columns(expr: &Expr) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    collect_columns(expr, &mut seen, &mut columns);
    columns
}

fn push_column(name: String, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if seen.insert(name.clone()) {
        out.push(name);
    }
}

fn collect_columns(expr: &Expr, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    match expr {
        Expr::Identifier(ident) => push_column(ident.value.clone(), seen, out),
        Expr::CompoundIdentifier(parts) => {
            let name = parts
                .iter()
                .map(|part| part.value.clone())
                .collect::<Vec<_>>()
                .join(".");
            push_column(name, seen, out);
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_columns(left, seen, out);
            collect_columns(right, seen, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            collect_columns(expr, seen, out);
        }
        Expr::IsNull(expr) | Expr::IsNotNull(expr) => collect_columns(expr, seen, out),
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_columns(expr, seen, out);
            collect_columns(low, seen, out);
            collect_columns(high, seen, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, seen, out);
            for item in list {
                collect_columns(item, seen, out);
            }
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            collect_columns(expr, seen, out);
            collect_columns(pattern, seen, out);
        }
        Expr::Function(function) => collect_function_columns(function, seen, out),
        _ => {}
    }
}

fn collect_function_columns(function: &Function, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if let FunctionArguments::List(list) = &function.args {
        for arg in &list.args {
            match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => {
                    collect_columns(expr, seen, out)
                }
                FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(expr),
                    ..
                } => collect_columns(expr, seen, out),
                _ => {}
            }
        }
    }
}

fn is_aggregate_function(function: &Function) -> bool {
    AGG_FUNCTIONS.contains(&function.name.to_string().to_lowercase().as_str())
}

/// Whole aggregate-call expressions (`sum(pv)`, `count(uv)`, ...) referenced
/// by an expression; the call is collected intact, not its argument columns
pub fn aggregate_exprs(expr: &Expr) -> Vec<Expr> {
    let mut exprs = Vec::new();
    collect_aggregates(expr, &mut exprs);
    exprs
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Function(function) if is_aggregate_function(function) => out.push(expr.clone()),
        Expr::BinaryOp { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            collect_aggregates(expr, out);
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_aggregates(expr, out);
            collect_aggregates(low, out);
            collect_aggregates(high, out);
        }
        _ => {}
    }
}

/// Every column identifier a statement references across its SELECT, WHERE,
/// GROUP BY, HAVING and ORDER BY clauses, deduplicated in appearance order
pub fn get_all_fields(sql: &str) -> Vec<String> {
    let statement = match parse_query(sql) {
        Ok(statement) => statement,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    if let Some(select) = statement_select(&statement) {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    collect_columns(expr, &mut seen, &mut fields)
                }
                _ => {}
            }
        }
        if let Some(selection) = &select.selection {
            collect_columns(selection, &mut seen, &mut fields);
        }
        for expr in group_by_exprs(select) {
            collect_columns(&expr, &mut seen, &mut fields);
        }
        if let Some(having) = &select.having {
            collect_columns(having, &mut seen, &mut fields);
        }
    }
    for expr in order_by_exprs(&statement) {
        collect_columns(&expr, &mut seen, &mut fields);
    }
    fields
}

/// Number of projection items, used to validate that statements being
/// unioned share a shape
pub fn projection_arity(sql: &str) -> Result<usize, ParserError> {
    let statement = parse_query(sql)?;
    match statement_select(&statement) {
        Some(select) => Ok(select.projection.len()),
        None => Err(ParserError::ParserError(
            "statement has no plain select body".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_all_fields() {
        let fields = get_all_fields(
            "select song_name from songs where singer_name = 'x' \
             and sys_imp_date = '2023-08-09' order by play_count desc",
        );
        assert_eq!(
            fields,
            vec!["song_name", "singer_name", "sys_imp_date", "play_count"]
        );
    }

    #[test]
    fn test_fields_inside_function_arguments() {
        let fields =
            get_all_fields("select a from t where datediff('day', release_date, '2023-08-09') <= 1");
        assert_eq!(fields, vec!["a", "release_date"]);
    }

    #[test]
    fn test_get_all_fields_unparsable() {
        assert!(get_all_fields("not sql at all ///").is_empty());
    }

    #[test]
    fn test_aggregate_exprs_collected_whole() {
        let statement = parse_query("select a from t group by a having sum(pv) > 2000").unwrap();
        let select = statement_select(&statement).unwrap();
        let having = select.having.as_ref().unwrap();

        let aggregates = aggregate_exprs(having);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].to_string(), "sum(pv)");
    }

    #[test]
    fn test_projection_arity() {
        assert_eq!(projection_arity("select a, b from t").unwrap(), 2);
        assert_eq!(projection_arity("select a, sum(b) from t group by a").unwrap(), 2);
        assert!(projection_arity("select from").is_err());
    }

    #[test]
    fn test_sys_field_prefix() {
        assert!(is_sys_field("sys_imp_date"));
        assert!(!is_sys_field("play_count"));
    }

    #[test]
    fn test_parse_rejects_multiple_statements() {
        assert!(parse_query("select a from t; select b from t").is_err());
    }
}
