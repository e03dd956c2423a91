use crate::api::middleware::AppError;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// SQL validation for raw-SQL requests entering the conversion path
pub struct SqlValidator;

impl SqlValidator {
    /// Validate that the SQL parses and contains only SELECT statements
    pub fn validate_select_only(sql: &str) -> Result<(), AppError> {
        let dialect = PostgreSqlDialect {};
        let ast = Parser::parse_sql(&dialect, sql)
            .map_err(|e| AppError::Conversion(format!("SQL parsing error: {}", e)))?;

        if ast.is_empty() {
            return Err(AppError::Conversion("Empty SQL query".to_string()));
        }

        for stmt in ast {
            match stmt {
                Statement::Query(_) => {
                    // Valid SELECT query
                }
                Statement::Insert { .. } => {
                    return Err(AppError::Conversion(
                        "INSERT statements are not allowed. Only SELECT queries are permitted."
                            .to_string(),
                    ));
                }
                Statement::Update { .. } => {
                    return Err(AppError::Conversion(
                        "UPDATE statements are not allowed. Only SELECT queries are permitted."
                            .to_string(),
                    ));
                }
                Statement::Delete { .. } => {
                    return Err(AppError::Conversion(
                        "DELETE statements are not allowed. Only SELECT queries are permitted."
                            .to_string(),
                    ));
                }
                Statement::Drop { .. } => {
                    return Err(AppError::Conversion(
                        "DROP statements are not allowed. Only SELECT queries are permitted."
                            .to_string(),
                    ));
                }
                Statement::CreateTable { .. } => {
                    return Err(AppError::Conversion(
                        "CREATE TABLE statements are not allowed. Only SELECT queries are permitted."
                            .to_string(),
                    ));
                }
                _ => {
                    return Err(AppError::Conversion(format!(
                        "Only SELECT queries are permitted. Found: {}",
                        stmt
                    )));
                }
            }
        }

        Ok(())
    }
}
