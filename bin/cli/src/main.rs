//! Console driver for the support workflow.
//!
//! Loads configuration, builds the Azure OpenAI backend and the support
//! graph, then pumps workflow events to the terminal: stage messages are
//! printed and input requests are answered from stdin. Ctrl-C cancels the
//! run. Logs go to stderr.

mod config;

use crate::config::AppConfig;
use std::process::ExitCode;
use std::sync::Arc;
use support_desk_ai::{AzureOpenAiBackend, LlmBackend};
use support_desk_conversation::{
    ConsoleChannel, InMemoryStateStore, InteractionChannel, SessionContext,
};
use support_desk_knowledge::KnowledgeBase;
use support_desk_workflow::{Orchestrator, SupportServices, WorkflowEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,support_desk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(report) => {
            eprintln!("Configuration Error: {}", report.current_context());
            return ExitCode::FAILURE;
        }
    };
    let backend = match AzureOpenAiBackend::new(&config.backend_config()) {
        Ok(backend) => backend,
        Err(report) => {
            eprintln!("Configuration Error: {}", report.current_context());
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        endpoint = %backend.url(),
        knowledge = %config.known_issues_path.display(),
        "loaded configuration"
    );

    let services = SupportServices::new(
        Arc::new(backend) as Arc<dyn LlmBackend>,
        Arc::new(KnowledgeBase::new(config.known_issues_path.clone())),
    )
    .with_policy(config.policy())
    .with_escalation_delays(config.escalation_delays());

    let (events, receiver) = mpsc::unbounded_channel();
    let orchestrator = match Orchestrator::support_over_events(&services, Arc::new(events)) {
        Ok(orchestrator) => orchestrator,
        Err(report) => {
            eprintln!("Fatal Error: {report}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling the session");
                cancel.cancel();
            }
        }
    });

    println!("Welcome to Support Workflow. Type your request below:");
    let pump = tokio::spawn(pump_events(receiver, cancel.clone()));

    let mut session = SessionContext::new(Arc::new(InMemoryStateStore::new()));
    let result = orchestrator.run(&mut session, None, &cancel).await;
    // Dropping the orchestrator closes the event stream and ends the pump.
    drop(orchestrator);
    if let Err(e) = pump.await {
        tracing::error!(error = %e, "event pump panicked");
    }

    match result {
        Ok(run) => {
            tracing::info!(
                run_id = %run.run_id,
                duration_ms = run.duration().map(|d| d.num_milliseconds()),
                "session finished"
            );
            println!("Thank you for using Support Workflow.");
            ExitCode::SUCCESS
        }
        Err(report) => {
            eprintln!("Fatal Error: {report}");
            ExitCode::FAILURE
        }
    }
}

/// Prints stage messages and answers input requests until the stream ends.
async fn pump_events(
    mut receiver: mpsc::UnboundedReceiver<WorkflowEvent>,
    cancel: CancellationToken,
) {
    let console = ConsoleChannel::stdio();
    while let Some(event) = receiver.recv().await {
        match event {
            WorkflowEvent::Message { text, .. } | WorkflowEvent::Notice { text } => {
                if let Err(e) = console.say(&text).await {
                    tracing::warn!(error = %e, "failed to write to the console");
                }
            }
            WorkflowEvent::InputRequested { prompt, reply } => {
                match console.ask(&prompt, &cancel).await {
                    Ok(answer) => {
                        if reply.send(answer).is_err() {
                            tracing::debug!("reply arrived after the run stopped waiting");
                        }
                    }
                    // Dropping `reply` tells the waiting stage the channel closed.
                    Err(e) => tracing::debug!(error = %e, "no reply from the console"),
                }
            }
            WorkflowEvent::RunFailed { stage, error, .. } => {
                tracing::debug!(stage = ?stage, %error, "run failed");
            }
            other => tracing::debug!(event_type = other.event_type(), "workflow event"),
        }
    }
}
