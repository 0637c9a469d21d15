//! Session abstraction used by the delivery executor.
//!
//! The executor only needs two calls from a session. Putting them behind a
//! trait lets the pool and executor run against an in-memory session in
//! tests and against [`pubrelay_client::Agent`] in production.

use std::{future::Future, pin::Pin};

use pubrelay_client::{Agent, Response, Result};
use pubrelay_core::{GrantOp, PublishOp};

/// A signed session able to perform queued operations.
pub trait Session: Send + Sync + 'static {
    /// Publishes the operation's payload.
    fn publish<'a>(
        &'a self,
        op: &'a PublishOp,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;

    /// Grants (or revokes) the operation's rights, returning the base
    /// response fields.
    fn grant<'a>(
        &'a self,
        op: &'a GrantOp,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;
}

impl Session for Agent {
    fn publish<'a>(
        &'a self,
        op: &'a PublishOp,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
        Box::pin(async move {
            let message = op.message();
            Agent::publish(self, op.channel.as_str(), &message, None, op.store_in_history).await
        })
    }

    fn grant<'a>(
        &'a self,
        op: &'a GrantOp,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
        Box::pin(async move {
            let response = Agent::grant(
                self,
                op.channel.as_str(),
                &op.auth_key,
                op.read,
                op.write,
                op.ttl_minutes,
            )
            .await?;
            Ok(response.response)
        })
    }
}

pub mod mock {
    //! Scripted in-memory session for testing delivery logic.
    //!
    //! Sessions built from one [`Script`] share its queue of answers and its
    //! call log, so a test can hand several sessions to a pool and still
    //! observe every call in order.

    use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};

    use pubrelay_client::{Response, Result, SessionError};
    use pubrelay_core::{GrantOp, OperationKind, PublishOp};
    use tokio::sync::Mutex;

    use super::Session;

    /// One scripted answer.
    #[derive(Debug, Clone)]
    pub enum Step {
        /// Answer with a well-formed response carrying this status.
        Status(u16),
        /// Answer with the response synthesized for an undecodable body.
        Undecodable,
        /// Fail without a response.
        Error(SessionError),
    }

    impl Step {
        fn into_result(self) -> Result<Response> {
            match self {
                Self::Status(status) => Ok(Response {
                    status,
                    error: !(200..300).contains(&status),
                    message: format!("scripted {status}"),
                    ..Response::default()
                }),
                Self::Undecodable => Ok(Response::synthetic("scripted undecodable body")),
                Self::Error(error) => Err(error),
            }
        }
    }

    /// A call observed by a scripted session.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        /// Index of the session that served the call.
        pub session: usize,
        /// Operation kind.
        pub kind: OperationKind,
        /// Channel of the operation.
        pub channel: String,
        /// Publish payload, empty for grants.
        pub payload: String,
    }

    /// Shared answers and call log.
    #[derive(Debug)]
    pub struct Script {
        steps: Mutex<VecDeque<Step>>,
        fallback: Step,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl Script {
        /// Creates a script that answers `200` once its steps run out.
        pub fn new() -> Self {
            Self::with_fallback(Step::Status(200))
        }

        /// Creates a script with a custom answer for when its steps run out.
        pub fn with_fallback(fallback: Step) -> Self {
            Self { steps: Mutex::new(VecDeque::new()), fallback, calls: Mutex::new(Vec::new()) }
        }

        /// Queues `step` for the next `times` calls.
        pub async fn then(&self, step: Step, times: usize) -> &Self {
            let mut steps = self.steps.lock().await;
            steps.extend(std::iter::repeat(step).take(times));
            drop(steps);
            self
        }

        /// Returns every call made so far, in order.
        pub async fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().await.clone()
        }

        /// Returns the number of calls made so far.
        pub async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }

        async fn answer(&self, call: RecordedCall) -> Result<Response> {
            self.calls.lock().await.push(call);
            let step = self.steps.lock().await.pop_front();
            step.unwrap_or_else(|| self.fallback.clone()).into_result()
        }
    }

    impl Default for Script {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Session answering from a shared [`Script`].
    #[derive(Debug, Clone)]
    pub struct ScriptedSession {
        id: usize,
        script: Arc<Script>,
    }

    impl ScriptedSession {
        /// Creates session `id` answering from `script`.
        pub fn new(id: usize, script: Arc<Script>) -> Self {
            Self { id, script }
        }

        /// Returns the session index.
        pub fn id(&self) -> usize {
            self.id
        }
    }

    impl Session for ScriptedSession {
        fn publish<'a>(
            &'a self,
            op: &'a PublishOp,
        ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
            Box::pin(async move {
                let call = RecordedCall {
                    session: self.id,
                    kind: OperationKind::Publish,
                    channel: op.channel.to_string(),
                    payload: op.message().into_owned(),
                };
                self.script.answer(call).await
            })
        }

        fn grant<'a>(
            &'a self,
            op: &'a GrantOp,
        ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
            Box::pin(async move {
                let call = RecordedCall {
                    session: self.id,
                    kind: OperationKind::Grant,
                    channel: op.channel.to_string(),
                    payload: String::new(),
                };
                self.script.answer(call).await
            })
        }
    }
}
