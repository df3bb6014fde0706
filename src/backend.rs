use crate::api::client::BackendClient;
use crate::api::types::{
    BulkAction, EmailDetail, FetchLogs, FetchMoreReport, FetchStatus, FetchStatusReport,
};
use crate::sync::poller::ControlCommand;
use std::sync::mpsc;
use std::thread;

/// Commands sent from the owning thread to the backend thread.
pub enum BackendCommand {
    FetchStatus,
    FetchMore {
        page_token: Option<String>,
        current_count: u64,
    },
    Control(ControlCommand),
    FetchLogs,
    GetEmail {
        id: String,
    },
    ApplyAction {
        action: BulkAction,
        ids: Vec<String>,
    },
    ClearCache,
    Shutdown,
}

/// Responses sent from the backend thread to the owning thread.
pub enum BackendResponse {
    Status(Result<FetchStatusReport, String>),
    More(Result<FetchMoreReport, String>),
    Control {
        command: ControlCommand,
        result: Result<FetchStatus, String>,
    },
    Logs(Result<FetchLogs, String>),
    EmailDetail {
        id: String,
        result: Box<Result<EmailDetail, String>>,
    },
    Action {
        action: BulkAction,
        ids: Vec<String>,
        result: Result<u64, String>,
    },
    CacheCleared(Result<u64, String>),
}

/// Spawn the backend thread. Returns the command sender and response receiver.
pub fn spawn(
    client: BackendClient,
) -> (
    mpsc::Sender<BackendCommand>,
    mpsc::Receiver<BackendResponse>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>();
    let (resp_tx, resp_rx) = mpsc::channel::<BackendResponse>();

    thread::spawn(move || {
        backend_loop(client, cmd_rx, resp_tx);
    });

    (cmd_tx, resp_rx)
}

fn backend_loop(
    client: BackendClient,
    cmd_rx: mpsc::Receiver<BackendCommand>,
    resp_tx: mpsc::Sender<BackendResponse>,
) {
    while let Ok(cmd) = cmd_rx.recv() {
        let response = match cmd {
            BackendCommand::FetchStatus => {
                BackendResponse::Status(client.fetch_status().map_err(|e| e.to_string()))
            }
            BackendCommand::FetchMore {
                page_token,
                current_count,
            } => BackendResponse::More(
                client
                    .fetch_more(page_token.as_deref(), current_count)
                    .map_err(|e| e.to_string()),
            ),
            BackendCommand::Control(command) => {
                let result = match command {
                    ControlCommand::Pause => client.pause(),
                    ControlCommand::Resume => client.resume(),
                };
                BackendResponse::Control {
                    command,
                    result: result.map_err(|e| e.to_string()),
                }
            }
            BackendCommand::FetchLogs => {
                BackendResponse::Logs(client.fetch_logs().map_err(|e| e.to_string()))
            }
            BackendCommand::GetEmail { id } => {
                let result = client.get_email(&id).map_err(|e| e.to_string());
                BackendResponse::EmailDetail {
                    id,
                    result: Box::new(result),
                }
            }
            BackendCommand::ApplyAction { action, ids } => {
                let result = client.apply_action(action, &ids).map_err(|e| e.to_string());
                BackendResponse::Action {
                    action,
                    ids,
                    result,
                }
            }
            BackendCommand::ClearCache => {
                BackendResponse::CacheCleared(client.clear_cache().map_err(|e| e.to_string()))
            }
            BackendCommand::Shutdown => break,
        };
        if resp_tx.send(response).is_err() {
            break;
        }
    }
    log_debug!("[Backend] thread exiting");
}
