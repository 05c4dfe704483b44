//! Thin wrappers over the extended query protocol (`PreparedStatement`,
//! `Portal`) and the result-shape built by draining a session's message
//! pump (`QueryResult`, `RowBlock`).

use crate::error::{Error, Result};
use crate::field::{Registry, Value};
use crate::message::backend::{CommandComplete, DataRow, RowDescription, msg_type};
use crate::message::frontend::{self, DescribeTarget};
use crate::message::types::{FormatCode, Oid, oid};
use crate::session::{ControlFlow, PumpOutcome, Session};

/// One result column's shape, as reported by the backend's
/// `RowDescription`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub type_oid: Oid,
    pub format: FormatCode,
}

/// What closed a `RowBlock`.
#[derive(Debug, Clone)]
pub enum BlockState {
    /// `CommandComplete`, carrying its command tag.
    Complete { tag: String },
    /// `PortalSuspended`: the row limit was hit before exhausting the portal.
    Suspended,
    /// `EmptyQueryResponse`: the submitted query string was empty.
    EmptyQuery,
}

/// One `RowDescription`-delimited run of rows within a `QueryResult`.
/// `fields` is `None` only for an anonymous block (rows collected without
/// ever seeing a `RowDescription`, which `get_query_results` only allows
/// when `require_row_desc` is false).
#[derive(Debug, Clone)]
pub struct RowBlock {
    pub fields: Option<Vec<FieldSpec>>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    pub state: BlockState,
}

impl RowBlock {
    /// Decode every row to a dynamically-typed `Value` via `registry`,
    /// falling back to plain TEXT-OID semantics for an anonymous block.
    pub fn block_to_rows<'b>(
        &'b self,
        registry: &'b Registry,
    ) -> impl Iterator<Item = Result<Vec<Value>>> + 'b {
        self.rows.iter().map(move |row| {
            row.iter()
                .enumerate()
                .map(|(i, value)| {
                    let (type_oid, format) = self
                        .fields
                        .as_ref()
                        .and_then(|fields| fields.get(i))
                        .map(|f| (f.type_oid, f.format))
                        .unwrap_or((oid::TEXT, FormatCode::Text));
                    match value {
                        Some(bytes) => registry.decode(type_oid, false, bytes, format),
                        None => Ok(Value::Null),
                    }
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Validate this block's fields against `expected` (column count and
    /// OIDs must match) and yield each row's raw column bytes, ready for
    /// `Deserializer::deserialize` keyed off `column_format`.
    pub fn block_to_tuples<'b>(
        &'b self,
        expected: &[Oid],
    ) -> Result<impl Iterator<Item = &'b [Option<Vec<u8>>]> + 'b> {
        let fields = self
            .fields
            .as_deref()
            .ok_or_else(|| Error::Client("block_to_tuples requires a RowDescription".into()))?;
        if fields.len() != expected.len() {
            return Err(Error::Client(format!(
                "column count mismatch: expected {}, got {}",
                expected.len(),
                fields.len()
            )));
        }
        for (field, &expected_oid) in fields.iter().zip(expected) {
            if field.type_oid != expected_oid {
                return Err(Error::Protocol(format!(
                    "column type mismatch: expected oid {expected_oid}, got {}",
                    field.type_oid
                )));
            }
        }
        Ok(self.rows.iter().map(Vec::as_slice))
    }

    /// Wire format of column `index`, for callers driving `block_to_tuples`.
    pub fn column_format(&self, index: usize) -> FormatCode {
        self.fields
            .as_ref()
            .and_then(|fields| fields.get(index))
            .map(|f| f.format)
            .unwrap_or_default()
    }
}

/// The full set of `RowBlock`s produced between one `Query`/`Sync` and its
/// terminating `ReadyForQuery` (a simple-query string may contain several
/// `;`-separated statements, each closing its own block).
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub blocks: Vec<RowBlock>,
}

/// Drain `session`'s pump through one full request/response round (up to
/// `ReadyForQuery`), collecting every `RowBlock` it produces.
///
/// `require_row_desc` rejects a `DataRow` that arrives with no preceding
/// `RowDescription` in the current block; extended-query callers that
/// already know the shape from a prior `Describe` pass `true`, simple-query
/// callers pass `false`.
pub fn get_query_results(session: &mut Session<'_>, require_row_desc: bool) -> Result<QueryResult> {
    let mut blocks: Vec<RowBlock> = Vec::new();
    let mut current_fields: Option<Vec<FieldSpec>> = None;
    let mut current_rows: Vec<Vec<Option<Vec<u8>>>> = Vec::new();
    let mut pending_error: Option<Error> = None;

    let outcome = session.poll_messages(
        |raw| {
            if pending_error.is_some() {
                return ControlFlow::Continue;
            }
            match raw.type_byte {
                msg_type::ROW_DESCRIPTION => match RowDescription::parse(raw.payload) {
                    Ok(desc) => {
                        current_fields = Some(
                            desc.iter()
                                .map(|f| FieldSpec {
                                    name: f.name.to_string(),
                                    type_oid: f.type_oid(),
                                    format: f.format(),
                                })
                                .collect(),
                        );
                        current_rows = Vec::new();
                    }
                    Err(e) => pending_error = Some(e),
                },
                msg_type::DATA_ROW => {
                    if current_fields.is_none() && require_row_desc {
                        pending_error =
                            Some(Error::Protocol("DataRow without RowDescription".into()));
                    } else {
                        match DataRow::parse(raw.payload) {
                            Ok(row) => {
                                let values: Vec<Option<Vec<u8>>> =
                                    row.iter().map(|v| v.map(<[u8]>::to_vec)).collect();
                                current_rows.push(values);
                            }
                            Err(e) => pending_error = Some(e),
                        }
                    }
                }
                msg_type::EMPTY_QUERY_RESPONSE => {
                    blocks.push(RowBlock {
                        fields: current_fields.take(),
                        rows: std::mem::take(&mut current_rows),
                        state: BlockState::EmptyQuery,
                    });
                }
                msg_type::COMMAND_COMPLETE => match CommandComplete::parse(raw.payload) {
                    Ok(cc) => {
                        blocks.push(RowBlock {
                            fields: current_fields.take(),
                            rows: std::mem::take(&mut current_rows),
                            state: BlockState::Complete {
                                tag: cc.tag.to_string(),
                            },
                        });
                    }
                    Err(e) => pending_error = Some(e),
                },
                msg_type::PORTAL_SUSPENDED => {
                    blocks.push(RowBlock {
                        fields: current_fields.take(),
                        rows: std::mem::take(&mut current_rows),
                        state: BlockState::Suspended,
                    });
                }
                _ => {}
            }
            ControlFlow::Continue
        },
        true,
    )?;

    if let Some(err) = pending_error {
        return Err(err);
    }

    match outcome {
        PumpOutcome::ReadyForQuery(_) => Ok(QueryResult { blocks }),
        PumpOutcome::Error(err) => Err(Error::Server(err)),
        other => Err(Error::Protocol(format!(
            "unexpected pump outcome while collecting query results: {other:?}"
        ))),
    }
}

/// A named (or unnamed, `""`) prepared statement. Thin: it's just the
/// bookkeeping `Parse`/`Close` need, not a handle back to the session.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    name: String,
    query: String,
    param_oids: Vec<Oid>,
    persist: bool,
}

impl PreparedStatement {
    /// `name = ""` is the unnamed statement, implicitly replaced by the next
    /// `Parse` that also targets it; `persist = false` marks a statement the
    /// caller intends to `Close` once it's done with it.
    pub fn new(name: impl Into<String>, query: impl Into<String>, param_oids: Vec<Oid>, persist: bool) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            param_oids,
            persist,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param_oids(&self) -> &[Oid] {
        &self.param_oids
    }

    pub fn param_count(&self) -> usize {
        self.param_oids.len()
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    /// Stage `Parse`.
    pub fn parse(&self, session: &mut Session<'_>) -> Result<()> {
        session.stage(|buf| frontend::build_parse(buf, &self.name, &self.query, &self.param_oids))
    }

    /// Stage `Close('S', name)`.
    pub fn close(&self, session: &mut Session<'_>) -> Result<()> {
        session.stage(|buf| frontend::build_close(buf, DescribeTarget::Statement, &self.name))
    }

    /// Pump `session` until `ParseComplete` is observed (or an error beats
    /// it to `ReadyForQuery`).
    pub fn ensure_parse_complete(&self, session: &mut Session<'_>) -> Result<()> {
        let mut seen = false;
        let outcome = session.poll_messages(
            |raw| {
                if raw.type_byte == msg_type::PARSE_COMPLETE {
                    seen = true;
                    ControlFlow::Break
                } else {
                    ControlFlow::Continue
                }
            },
            true,
        )?;
        match outcome {
            PumpOutcome::InterceptorBreak if seen => Ok(()),
            PumpOutcome::Error(err) => Err(Error::Server(err)),
            other => Err(Error::Protocol(format!(
                "unexpected pump outcome while waiting for ParseComplete: {other:?}"
            ))),
        }
    }
}

/// A named (or unnamed) portal bound from a `PreparedStatement`.
#[derive(Debug, Clone)]
pub struct Portal {
    name: String,
    statement_name: String,
    persist: bool,
}

impl Portal {
    pub fn new(name: impl Into<String>, statement_name: impl Into<String>, persist: bool) -> Self {
        Self {
            name: name.into(),
            statement_name: statement_name.into(),
            persist,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    /// Stage `Bind`. `params` holds pre-encoded (`serialize_param`) values.
    pub fn bind(
        &self,
        session: &mut Session<'_>,
        params: &[Option<Vec<u8>>],
        param_formats: &[FormatCode],
        result_formats: &[FormatCode],
    ) -> Result<()> {
        session.stage(|buf| {
            frontend::build_bind(
                buf,
                &self.name,
                &self.statement_name,
                params,
                param_formats,
                result_formats,
            )
        })
    }

    /// Stage `Execute`, optionally preceded by `Describe('P')` when the
    /// caller hasn't already learned this portal's row shape.
    pub fn execute(&self, session: &mut Session<'_>, max_rows: u32, describe: bool) -> Result<()> {
        session.stage(|buf| {
            if describe {
                frontend::build_describe(buf, DescribeTarget::Portal, &self.name);
            }
            frontend::build_execute(buf, &self.name, max_rows);
        })
    }

    /// Stage `Close('P', name)`.
    pub fn close(&self, session: &mut Session<'_>) -> Result<()> {
        session.stage(|buf| frontend::build_close(buf, DescribeTarget::Portal, &self.name))
    }

    /// Pump `session` until `BindComplete` is observed (or an error beats
    /// it to `ReadyForQuery`).
    pub fn ensure_bind_complete(&self, session: &mut Session<'_>) -> Result<()> {
        let mut seen = false;
        let outcome = session.poll_messages(
            |raw| {
                if raw.type_byte == msg_type::BIND_COMPLETE {
                    seen = true;
                    ControlFlow::Break
                } else {
                    ControlFlow::Continue
                }
            },
            true,
        )?;
        match outcome {
            PumpOutcome::InterceptorBreak if seen => Ok(()),
            PumpOutcome::Error(err) => Err(Error::Server(err)),
            other => Err(Error::Protocol(format!(
                "unexpected pump outcome while waiting for BindComplete: {other:?}"
            ))),
        }
    }
}
