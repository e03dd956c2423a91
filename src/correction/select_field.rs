use std::collections::HashSet;

use sqlparser::ast::{Expr, Ident, SelectItem};

use crate::correction::{CorrectionError, Corrector};
use crate::models::QueryStatement;
use crate::validation::select_helper::{
    aggregate_exprs, expr_columns, group_by_exprs, has_group_by, has_wildcard, is_sys_field,
    order_by_exprs, parse_query, select_field_strings, statement_select, statement_select_mut,
};

/// Ordering applied to columns appended to the select list.
///
/// `Appearance` follows the first reference scanning WHERE, GROUP BY,
/// HAVING, ORDER BY; `Lexicographic` sorts the appended items for output
/// that is stable under clause reshuffling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InjectionOrder {
    #[default]
    Appearance,
    Lexicographic,
}

/// Completes the select list so that every field referenced elsewhere in
/// the statement is also selected.
///
/// Ungrouped statements receive the bare columns referenced in WHERE and
/// ORDER BY. Grouped statements receive their GROUP BY columns and the
/// whole aggregate expressions referenced in HAVING/ORDER BY; bare WHERE
/// columns are left out there, since selecting an unaggregated, ungrouped
/// column would make the statement invalid. Fields with the reserved
/// system prefix are never injected.
#[derive(Debug, Default)]
pub struct SelectFieldAppendCorrector {
    order: InjectionOrder,
}

impl SelectFieldAppendCorrector {
    pub fn with_order(order: InjectionOrder) -> Self {
        Self { order }
    }

    fn column_expr(name: &str) -> Expr {
        if name.contains('.') {
            Expr::CompoundIdentifier(name.split('.').map(Ident::new).collect())
        } else {
            Expr::Identifier(Ident::new(name))
        }
    }

    fn push_column(
        name: String,
        seen: &mut HashSet<String>,
        missing: &mut Vec<(String, Expr)>,
    ) {
        if !is_sys_field(&name) && seen.insert(name.clone()) {
            let expr = Self::column_expr(&name);
            missing.push((name, expr));
        }
    }
}

impl Corrector for SelectFieldAppendCorrector {
    fn name(&self) -> &'static str {
        "select-field-append"
    }

    fn correct(&self, statement: &mut QueryStatement) -> Result<(), CorrectionError> {
        let mut ast = parse_query(&statement.sql)
            .map_err(|e| CorrectionError::Unparseable(e.to_string()))?;

        let order_exprs = order_by_exprs(&ast);
        let mut missing: Vec<(String, Expr)> = Vec::new();

        {
            let select = match statement_select(&ast) {
                Some(select) => select,
                // set operations and other exotic bodies pass through untouched
                None => return Ok(()),
            };

            if !has_wildcard(select) {
                let mut seen: HashSet<String> =
                    select_field_strings(select).into_iter().collect();

                if has_group_by(select) {
                    for expr in group_by_exprs(select) {
                        for column in expr_columns(&expr) {
                            Self::push_column(column, &mut seen, &mut missing);
                        }
                    }

                    let mut having_and_orders: Vec<Expr> = Vec::new();
                    if let Some(having) = &select.having {
                        having_and_orders.push(having.clone());
                    }
                    having_and_orders.extend(order_exprs.iter().cloned());

                    for source in &having_and_orders {
                        for aggregate in aggregate_exprs(source) {
                            let columns = expr_columns(&aggregate);
                            if !columns.is_empty()
                                && columns.iter().all(|column| is_sys_field(column))
                            {
                                continue;
                            }
                            let key = aggregate.to_string();
                            if seen.insert(key.clone()) {
                                missing.push((key, aggregate));
                            }
                        }
                    }
                } else {
                    if let Some(selection) = &select.selection {
                        for column in expr_columns(selection) {
                            Self::push_column(column, &mut seen, &mut missing);
                        }
                    }
                    for expr in &order_exprs {
                        for column in expr_columns(expr) {
                            Self::push_column(column, &mut seen, &mut missing);
                        }
                    }
                }
            }
        }

        if self.order == InjectionOrder::Lexicographic {
            missing.sort_by(|a, b| a.0.cmp(&b.0));
        }

        if let Some(select) = statement_select_mut(&mut ast) {
            for (_, expr) in missing {
                select.projection.push(SelectItem::UnnamedExpr(expr));
            }
        }

        statement.sql = ast.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryType;

    fn correct(sql: &str) -> String {
        correct_with(SelectFieldAppendCorrector::default(), sql)
    }

    fn correct_with(corrector: SelectFieldAppendCorrector, sql: &str) -> String {
        let mut statement = QueryStatement::new(1, sql.to_string(), QueryType::Sql);
        corrector.correct(&mut statement).unwrap();
        statement.sql
    }

    #[test]
    fn test_appends_where_and_order_by_fields() {
        let corrected = correct(
            "select 歌曲名 from 歌曲库 where datediff('day', 发布日期, '2023-08-09') <= 1 \
             and 歌手名 = '邓紫棋' and sys_imp_date = '2023-08-09' \
             and 歌曲发布时 = '2023-08-01' order by 播放量 desc limit 11",
        );

        assert_eq!(
            corrected,
            "SELECT 歌曲名, 发布日期, 歌手名, 歌曲发布时, 播放量 FROM 歌曲库 \
             WHERE datediff('day', 发布日期, '2023-08-09') <= 1 AND 歌手名 = '邓紫棋' \
             AND sys_imp_date = '2023-08-09' AND 歌曲发布时 = '2023-08-01' \
             ORDER BY 播放量 DESC LIMIT 11"
        );
    }

    #[test]
    fn test_grouped_statement_appends_having_aggregate_only() {
        let corrected = correct(
            "select 用户名 from 内容库产品 where datediff('day', 数据日期, '2023-09-14') <= 30 \
             group by 用户名 having sum(访问次数) > 2000",
        );

        // the filter-only date column stays out of the select list
        assert_eq!(
            corrected,
            "SELECT 用户名, sum(访问次数) FROM 内容库产品 \
             WHERE datediff('day', 数据日期, '2023-09-14') <= 30 \
             GROUP BY 用户名 HAVING sum(访问次数) > 2000"
        );
    }

    #[test]
    fn test_idempotent_byte_for_byte() {
        let once = correct(
            "select 用户名 from 内容库产品 where datediff('day', 数据日期, '2023-09-14') <= 30 \
             group by 用户名 having sum(访问次数) > 2000",
        );
        let twice = correct(&once);
        assert_eq!(once, twice);

        let once = correct(
            "select 歌曲名 from 歌曲库 where 歌手名 = '邓紫棋' order by 播放量 desc limit 11",
        );
        let twice = correct(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_completeness_for_ungrouped_statements() {
        let cases = [
            "select a from t where b = 1 and c > 2 order by d",
            "select x from t where f(y) = 'v' and sys_imp_date = '2024-01-01'",
            "select a, b from t where a = 1 and e in (1, 2)",
        ];

        for sql in cases {
            let corrected = correct(sql);
            let statement = parse_query(&corrected).unwrap();
            let select = statement_select(&statement).unwrap();
            let selected: HashSet<String> =
                select_field_strings(select).into_iter().collect();

            let mut referenced = Vec::new();
            if let Some(selection) = &select.selection {
                referenced.extend(expr_columns(selection));
            }
            for expr in order_by_exprs(&statement) {
                referenced.extend(expr_columns(&expr));
            }

            for column in referenced {
                if !is_sys_field(&column) {
                    assert!(
                        selected.contains(&column),
                        "{} missing from select list of {}",
                        column,
                        corrected
                    );
                }
            }
        }
    }

    #[test]
    fn test_sys_fields_never_injected() {
        let corrected =
            correct("select a from t where sys_imp_date = '2023-08-09' and b = 1");
        assert_eq!(corrected, "SELECT a, b FROM t WHERE sys_imp_date = '2023-08-09' AND b = 1");
    }

    #[test]
    fn test_wildcard_select_is_not_extended() {
        let corrected = correct("select * from t where b = 1 order by c");
        assert_eq!(corrected, "SELECT * FROM t WHERE b = 1 ORDER BY c");
    }

    #[test]
    fn test_lexicographic_injection_order() {
        let corrector = SelectFieldAppendCorrector::with_order(InjectionOrder::Lexicographic);
        let corrected = correct_with(
            corrector,
            "select name from t where zeta = 1 and alpha = 2 order by mid",
        );
        assert_eq!(
            corrected,
            "SELECT name, alpha, mid, zeta FROM t WHERE zeta = 1 AND alpha = 2 ORDER BY mid"
        );
    }

    #[test]
    fn test_unparseable_sql_leaves_statement_unchanged() {
        let corrector = SelectFieldAppendCorrector::default();
        let mut statement = QueryStatement::new(1, "not sql ///".to_string(), QueryType::Sql);

        assert!(corrector.correct(&mut statement).is_err());
        assert_eq!(statement.sql, "not sql ///");
    }
}
