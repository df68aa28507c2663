//! Client-to-server reply packets.

use std::fmt;

use crate::{ParseError, Tokens};

/// A reply a worker sends back to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `login <name> <benchResult> <hashSize>`
    Login {
        name: String,
        bench_result: i32,
        hash_size: i32,
    },
    /// `updatevalue <pid> <itd> <pld> <move> <value> <alpha> <beta> <nodes> <pv...>`
    ///
    /// `value` and the window are expressed in the parent's perspective;
    /// `pv` starts with the searched move's best child and may be empty.
    UpdateValue {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
        mv: String,
        value: i32,
        alpha: i32,
        beta: i32,
        nodes: i64,
        pv: Vec<String>,
    },
    /// `searchdone <pid> <itd> <pld>`
    SearchDone {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
    },
}

impl Reply {
    pub fn parse(line: &str) -> Result<Reply, ParseError> {
        let mut iter = line.split_whitespace();
        let head = iter.next().ok_or(ParseError::Empty)?;
        match head {
            "login" => Self::parse_login(Tokens::new("login", iter)),
            "updatevalue" => Self::parse_updatevalue(Tokens::new("updatevalue", iter)),
            "searchdone" => Self::parse_searchdone(Tokens::new("searchdone", iter)),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }

    /// Replies share one send priority; the slot exists so both packet
    /// directions queue through the same machinery.
    pub fn priority(&self) -> u8 {
        crate::PRIORITY_NORMAL
    }

    fn parse_login(mut t: Tokens<'_>) -> Result<Reply, ParseError> {
        let name = t.next("name")?.to_string();
        let bench_result = t.next_i32("bench_result")?;
        let hash_size = t.next_i32("hash_size")?;
        t.expect_end()?;
        Ok(Reply::Login { name, bench_result, hash_size })
    }

    fn parse_updatevalue(mut t: Tokens<'_>) -> Result<Reply, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        let mv = t.next("move")?.to_string();
        let value = t.next_i32("value")?;
        let alpha = t.next_i32("alpha")?;
        let beta = t.next_i32("beta")?;
        let nodes = t.next_i64("nodes")?;
        let pv = t.rest();
        Ok(Reply::UpdateValue {
            position_id,
            iteration_depth,
            ply_depth,
            mv,
            value,
            alpha,
            beta,
            nodes,
            pv,
        })
    }

    fn parse_searchdone(mut t: Tokens<'_>) -> Result<Reply, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        t.expect_end()?;
        Ok(Reply::SearchDone { position_id, iteration_depth, ply_depth })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Login { name, bench_result, hash_size } => {
                write!(f, "login {name} {bench_result} {hash_size}")
            }
            Reply::UpdateValue {
                position_id,
                iteration_depth,
                ply_depth,
                mv,
                value,
                alpha,
                beta,
                nodes,
                pv,
            } => {
                write!(
                    f,
                    "updatevalue {position_id} {iteration_depth} {ply_depth} {mv} {value} {alpha} {beta} {nodes}"
                )?;
                if !pv.is_empty() {
                    write!(f, " {}", pv.join(" "))?;
                }
                Ok(())
            }
            Reply::SearchDone { position_id, iteration_depth, ply_depth } => {
                write!(f, "searchdone {position_id} {iteration_depth} {ply_depth}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(line: &str) -> Reply {
        let reply = Reply::parse(line).unwrap();
        assert_eq!(reply.to_string(), line, "emit differs from wire form");
        assert_eq!(Reply::parse(&reply.to_string()).unwrap(), reply);
        reply
    }

    #[test]
    fn parse_login() {
        let reply = round_trip("login kakiage 0 100");
        assert_eq!(
            reply,
            Reply::Login { name: "kakiage".into(), bench_result: 0, hash_size: 100 }
        );
    }

    #[test]
    fn parse_updatevalue_with_pv() {
        let reply = round_trip("updatevalue 1 6 2 8c8d 30 -100 100 0 3d3e 2f2e");
        match reply {
            Reply::UpdateValue { mv, value, alpha, beta, nodes, pv, .. } => {
                assert_eq!(mv, "8c8d");
                assert_eq!((value, alpha, beta, nodes), (30, -100, 100, 0));
                assert_eq!(pv, vec!["3d3e", "2f2e"]);
            }
            _ => panic!("expected UpdateValue"),
        }
    }

    #[test]
    fn parse_updatevalue_empty_pv() {
        let reply = round_trip("updatevalue 1 6 2 8c8d 29999 29999 30000 0");
        match reply {
            Reply::UpdateValue { pv, .. } => assert!(pv.is_empty()),
            _ => panic!("expected UpdateValue"),
        }
    }

    #[test]
    fn parse_searchdone() {
        let reply = round_trip("searchdone 1 6 2");
        assert_eq!(
            reply,
            Reply::SearchDone { position_id: 1, iteration_depth: 6, ply_depth: 2 }
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Reply::parse(""), Err(ParseError::Empty));
        assert!(matches!(Reply::parse("retried 1"), Err(ParseError::Unknown(_))));
        assert!(matches!(
            Reply::parse("login kakiage"),
            Err(ParseError::MissingField { field: "bench_result", .. })
        ));
        assert!(matches!(
            Reply::parse("updatevalue 1 6 2 8c8d 30 -100 100"),
            Err(ParseError::MissingField { field: "nodes", .. })
        ));
        assert!(matches!(
            Reply::parse("searchdone 1 6 x"),
            Err(ParseError::BadInteger { field: "ply_depth", .. })
        ));
    }

    #[test]
    fn negative_values_survive() {
        round_trip("updatevalue 12 8 0 P*5e -29999 -30001 30001 123456789 G*5b");
    }
}
