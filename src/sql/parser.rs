//! # Aggregate Query Parser
//!
//! Extracts the five facts the scheduler needs from a query string:
//! aggregate function, column, table, optional `amount` predicate, and
//! optional group-by column. The accepted grammar:
//!
//! ```text
//! SELECT <AGG>(<col>) [FROM <table>] [WHERE <predicate>] [GROUP BY <col>] [;]
//! ```
//!
//! with `AGG` one of SUM, COUNT, AVG (case-insensitive) and `<col>` a bare
//! identifier or `*` inside COUNT.
//!
//! ## Predicates
//!
//! Three shapes on the `amount` column are recognized and reduced to an
//! inclusive range:
//!
//! ```text
//! amount BETWEEN lo AND hi          ->  [lo, hi]
//! amount >  lo                      ->  [lo, AMOUNT_UPPER_DEFAULT]
//! amount >= lo AND amount <= hi     ->  [lo, hi]
//! ```
//!
//! Any other WHERE body is treated as absent rather than an error: the
//! predicate evaluator behind unrecognized conjuncts is an external
//! collaborator, not part of this engine. An unknown aggregate function is
//! a hard parse error.

use eyre::{bail, Result};

use super::lexer::{Keyword, Lexer, Token};
use crate::config::AMOUNT_UPPER_DEFAULT;
use crate::exec::{Aggregate, AmountFilter};

/// A parsed aggregate query. Borrows identifier names from the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct AggQuery<'a> {
    pub aggregate: Aggregate,
    pub column: &'a str,
    pub table: Option<&'a str>,
    pub filter: Option<AmountFilter>,
    pub group_by: Option<&'a str>,
}

pub fn parse_query(input: &str) -> Result<AggQuery<'_>> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.query()
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Token<'a> {
        self.tokens.get(self.pos).copied().unwrap_or(Token::Eof)
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        match self.advance() {
            Token::Keyword(k) if k == keyword => Ok(()),
            other => bail!("expected {keyword:?}, found {other:?}"),
        }
    }

    fn query(&mut self) -> Result<AggQuery<'a>> {
        self.expect_keyword(Keyword::Select)?;

        let aggregate = match self.advance() {
            Token::Keyword(Keyword::Sum) => Aggregate::Sum,
            Token::Keyword(Keyword::Count) => Aggregate::Count,
            Token::Keyword(Keyword::Avg) => Aggregate::Avg,
            other => bail!("unsupported aggregate function: {other:?}"),
        };

        match self.advance() {
            Token::LParen => {}
            other => bail!("expected '(' after aggregate, found {other:?}"),
        }
        let column = match self.advance() {
            Token::Ident(name) => name,
            Token::Star if aggregate == Aggregate::Count => "*",
            other => bail!("expected column name, found {other:?}"),
        };
        match self.advance() {
            Token::RParen => {}
            other => bail!("expected ')' after column, found {other:?}"),
        }

        let table = if self.peek() == Token::Keyword(Keyword::From) {
            self.advance();
            match self.advance() {
                Token::Ident(name) => Some(name),
                other => bail!("expected table name after FROM, found {other:?}"),
            }
        } else {
            None
        };

        let filter = if self.peek() == Token::Keyword(Keyword::Where) {
            self.advance();
            self.where_filter()
        } else {
            None
        };

        let group_by = if self.peek() == Token::Keyword(Keyword::Group) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            match self.advance() {
                Token::Ident(name) => Some(name),
                other => bail!("expected column name after GROUP BY, found {other:?}"),
            }
        } else {
            None
        };

        match self.advance() {
            Token::Semicolon | Token::Eof => {}
            other => bail!("unexpected trailing token: {other:?}"),
        }

        Ok(AggQuery {
            aggregate,
            column,
            table,
            filter,
            group_by,
        })
    }

    /// Tries the recognized predicate shapes; on mismatch, skips the WHERE
    /// body (up to GROUP BY or end) and reports no filter.
    fn where_filter(&mut self) -> Option<AmountFilter> {
        let checkpoint = self.pos;
        if let Some(filter) = self.try_amount_predicate() {
            // A recognized predicate may still be followed by unrecognized
            // conjuncts; skip them too.
            self.skip_where_tail();
            return Some(filter);
        }
        self.pos = checkpoint;
        self.skip_where_tail();
        None
    }

    fn skip_where_tail(&mut self) {
        while !matches!(
            self.peek(),
            Token::Keyword(Keyword::Group) | Token::Semicolon | Token::Eof
        ) {
            self.advance();
        }
    }

    fn try_amount_predicate(&mut self) -> Option<AmountFilter> {
        match self.advance() {
            Token::Ident(name) if name.eq_ignore_ascii_case("amount") => {}
            _ => return None,
        }

        match self.advance() {
            Token::Keyword(Keyword::Between) => {
                let lo = self.number()?;
                match self.advance() {
                    Token::Keyword(Keyword::And) => {}
                    _ => return None,
                }
                let hi = self.number()?;
                Some(AmountFilter::new(lo, hi))
            }
            Token::Ge => {
                let lo = self.number()?;
                // Optional "AND amount <= hi" half.
                if self.peek() == Token::Keyword(Keyword::And) {
                    let checkpoint = self.pos;
                    self.advance();
                    match (self.advance(), self.advance()) {
                        (Token::Ident(name), Token::Le)
                            if name.eq_ignore_ascii_case("amount") =>
                        {
                            let hi = self.number()?;
                            return Some(AmountFilter::new(lo, hi));
                        }
                        _ => self.pos = checkpoint,
                    }
                }
                Some(AmountFilter::new(lo, AMOUNT_UPPER_DEFAULT))
            }
            Token::Gt => {
                let lo = self.number()?;
                Some(AmountFilter::new(lo, AMOUNT_UPPER_DEFAULT))
            }
            _ => None,
        }
    }

    fn number(&mut self) -> Option<f64> {
        match self.advance() {
            Token::Number(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_aggregate() {
        let q = parse_query("SELECT SUM(amount) FROM sales").unwrap();
        assert_eq!(q.aggregate, Aggregate::Sum);
        assert_eq!(q.column, "amount");
        assert_eq!(q.table, Some("sales"));
        assert!(q.filter.is_none());
        assert!(q.group_by.is_none());

        let q = parse_query("select avg(amount) from t").unwrap();
        assert_eq!(q.aggregate, Aggregate::Avg);

        let q = parse_query("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(q.aggregate, Aggregate::Count);
        assert_eq!(q.column, "*");
    }

    #[test]
    fn from_clause_is_optional() {
        let q = parse_query("SELECT SUM(amount)").unwrap();
        assert_eq!(q.table, None);
    }

    #[test]
    fn between_predicate() {
        let q = parse_query("SELECT SUM(amount) FROM t WHERE amount BETWEEN 100 AND 200").unwrap();
        assert_eq!(q.filter, Some(AmountFilter::new(100.0, 200.0)));
    }

    #[test]
    fn greater_than_predicate_gets_default_upper_bound() {
        let q = parse_query("SELECT SUM(amount) FROM t WHERE amount > 50.5").unwrap();
        let filter = q.filter.unwrap();
        assert_eq!(filter.min, 50.5);
        assert_eq!(filter.max, AMOUNT_UPPER_DEFAULT);
    }

    #[test]
    fn bounded_range_predicate() {
        let q =
            parse_query("SELECT AVG(amount) FROM t WHERE amount >= 10 AND amount <= 20").unwrap();
        assert_eq!(q.filter, Some(AmountFilter::new(10.0, 20.0)));
    }

    #[test]
    fn unrecognized_predicate_is_treated_as_absent() {
        let q = parse_query("SELECT SUM(amount) FROM t WHERE region = 3").unwrap();
        assert!(q.filter.is_none());

        let q = parse_query("SELECT SUM(amount) FROM t WHERE region = 3 GROUP BY region").unwrap();
        assert!(q.filter.is_none());
        assert_eq!(q.group_by, Some("region"));
    }

    #[test]
    fn group_by_clause() {
        let q = parse_query("SELECT AVG(amount) FROM sales GROUP BY region;").unwrap();
        assert_eq!(q.group_by, Some("region"));
    }

    #[test]
    fn predicate_and_group_by_combine() {
        let q = parse_query(
            "SELECT SUM(amount) FROM t WHERE amount BETWEEN 1 AND 9 GROUP BY product_id",
        )
        .unwrap();
        assert_eq!(q.filter, Some(AmountFilter::new(1.0, 9.0)));
        assert_eq!(q.group_by, Some("product_id"));
    }

    #[test]
    fn unknown_aggregate_is_an_error() {
        let err = parse_query("SELECT MAX(amount) FROM t").unwrap_err();
        assert!(err.to_string().contains("unsupported aggregate"));
    }

    #[test]
    fn malformed_query_is_an_error() {
        assert!(parse_query("SUM(amount)").is_err());
        assert!(parse_query("SELECT SUM amount FROM t").is_err());
        assert!(parse_query("SELECT SUM(amount FROM t").is_err());
    }
}
