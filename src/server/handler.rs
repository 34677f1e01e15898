//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! PG wire protocol handler that bridges pgwire traits to a [`Session`].
//!
//! Every connection shares the same session, and with it the same engine
//! and connection. The session serializes statements, so concurrent clients
//! see them applied one at a time in arrival order.

use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{Response, Tag};
use pgwire::api::{ClientInfo, NoopHandler, PgWireServerHandlers};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use tracing::debug;

use super::encode;
use crate::error::Error;
use crate::session::Session;
use crate::sql::{self, StatementKind};

/// SQLSTATE code reported to clients for a session error.
fn sqlstate(e: &Error) -> &'static str {
    match e {
        Error::NotInitialized => "55000",
        Error::InvalidInput(_) => "22023",
        Error::Query(_) => "42000",
        _ => "XX000",
    }
}

fn user_error(e: Error) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".to_string(),
        sqlstate(&e).to_string(),
        e.to_string(),
    )))
}

/// Handler answering simple-protocol queries from the shared session.
pub struct DashHandler {
    session: Session,
}

impl DashHandler {
    pub fn new(session: Session) -> Self {
        DashHandler { session }
    }

    async fn run_statement(&self, stmt: &str) -> PgWireResult<Response> {
        match sql::classify(stmt) {
            StatementKind::Query => {
                let rows = self.session.query_set(stmt).await.map_err(user_error)?;
                Ok(Response::Query(encode::encode_row_set(&rows)?))
            }
            StatementKind::Command => {
                self.session.execute(stmt).await.map_err(user_error)?;
                Ok(Response::Execution(
                    Tag::new(&sql::command_tag(stmt)).with_rows(0),
                ))
            }
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for DashHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        debug!(query, "simple query");
        // Text the parser rejects goes to the engine whole, which reports
        // the real error.
        let statements = sql::split_statements(query).unwrap_or_else(|_| vec![query.to_string()]);
        if statements.iter().all(|s| s.trim().is_empty()) {
            return Ok(vec![Response::EmptyQuery]);
        }

        let mut responses = Vec::with_capacity(statements.len());
        for stmt in &statements {
            responses.push(self.run_statement(stmt).await?);
        }
        Ok(responses)
    }
}

/// Hands the same handler to every connection.
pub struct DashHandlerFactory {
    handler: Arc<DashHandler>,
}

impl DashHandlerFactory {
    pub fn new(session: Session) -> Self {
        DashHandlerFactory {
            handler: Arc::new(DashHandler::new(session)),
        }
    }
}

impl PgWireServerHandlers for DashHandlerFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        Arc::new(NoopHandler)
    }

    fn startup_handler(&self) -> Arc<impl pgwire::api::auth::StartupHandler> {
        Arc::new(NoopHandler)
    }
}
