use crate::correction::{CorrectionError, Corrector};
use crate::models::QueryStatement;
use crate::validation::select_helper::parse_query;

/// Canonicalizes SQL keyword casing by re-serializing the parsed statement.
/// Identifier and function-name casing is preserved.
pub struct KeywordCorrector;

impl Corrector for KeywordCorrector {
    fn name(&self) -> &'static str {
        "keyword-casing"
    }

    fn correct(&self, statement: &mut QueryStatement) -> Result<(), CorrectionError> {
        let ast = parse_query(&statement.sql)
            .map_err(|e| CorrectionError::Unparseable(e.to_string()))?;
        statement.sql = ast.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryType;

    fn correct(sql: &str) -> String {
        let mut statement = QueryStatement::new(1, sql.to_string(), QueryType::Sql);
        KeywordCorrector.correct(&mut statement).unwrap();
        statement.sql
    }

    #[test]
    fn test_uppercases_keywords() {
        assert_eq!(
            correct("select a from t where b = 1 group by a having sum(c) > 2 order by a desc limit 5"),
            "SELECT a FROM t WHERE b = 1 GROUP BY a HAVING sum(c) > 2 ORDER BY a DESC LIMIT 5"
        );
    }

    #[test]
    fn test_preserves_identifier_casing() {
        assert_eq!(
            correct("select UserName from Events where UserName = 'A'"),
            "SELECT UserName FROM Events WHERE UserName = 'A'"
        );
    }

    #[test]
    fn test_canonical_text_is_fixed_point() {
        let once = correct("select a from t where b = 1 order by a desc");
        assert_eq!(correct(&once), once);
    }
}
