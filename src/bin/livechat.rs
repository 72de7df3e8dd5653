//! Interactive terminal chat over a live deployment.
//!
//! # Usage
//!
//! ```bash
//! # Connect using $CONVEX_URL
//! livechat
//!
//! # Connect to a specific deployment
//! livechat --url https://happy-otter-123.convex.cloud
//!
//! # Keep the same name across runs
//! livechat --session ~/.livechat-session.json
//!
//! # Read settings from a file, without colors
//! livechat --config livechat.yaml --no-color
//! ```
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/whoami` - Show the name you post as
//! - `/draft` - Show the message waiting to be sent
//! - `/quit` - Exit the application
//!
//! Any other line is posted as a message.  Logging goes to stderr and is
//! controlled by `RUST_LOG` (default `warn`).

use std::io::{self, Write};
use std::sync::{Arc, mpsc as std_mpsc};

use arrrg::CommandLine;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, ExternalPrinter};
use tokio::sync::{Notify, mpsc};
use tracing_subscriber::EnvFilter;

use livechat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatView, PlainTextRenderer, Renderer, ScrollTarget,
    TailCursor, help_text, parse_command,
};
use livechat::{
    Convex, FileSessionStorage, MemorySessionStorage, RandomNames, Scope, SessionStorage,
    TracingClientLogger, get_or_set_fake_name,
};

/// What the reader thread saw.
enum Input {
    Line(String),
    Eof,
    Failed(String),
}

enum Flow {
    Continue,
    Quit,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Buffers rendered output and hands each flushed chunk to the line editor,
/// which prints it above the prompt.
struct PromptWriter<P> {
    printer: P,
    pending: Vec<u8>,
}

impl<P: ExternalPrinter> Write for PromptWriter<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        self.printer
            .print(text)
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Reads lines on a dedicated thread.  After each line the thread waits for
/// the main loop to resume it, so the prompt only returns once the line has
/// been handled; dropping `resume` stops the thread outside of raw mode.
fn spawn_reader(
    mut editor: DefaultEditor,
    lines: mpsc::UnboundedSender<Input>,
    resume: std_mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line.as_str());
                    if lines.send(Input::Line(line)).is_err() || resume.recv().is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    let _ = lines.send(Input::Eof);
                    break;
                }
                Err(err) => {
                    let _ = lines.send(Input::Failed(err.to_string()));
                    break;
                }
            }
        }
    });
}

async fn handle_line(view: &ChatView, line: String, renderer: &mut dyn Renderer) -> Flow {
    if let Some(cmd) = parse_command(&line) {
        match cmd {
            ChatCommand::Quit => return Flow::Quit,
            ChatCommand::Help => {
                for line in help_text().lines() {
                    renderer.print_info(&format!("    {}", line));
                }
            }
            ChatCommand::Whoami => {
                renderer.print_info(&format!("Connected as {}", view.name()));
            }
            ChatCommand::Draft => {
                let draft = view.draft();
                if draft.is_empty() {
                    renderer.print_info("(no draft)");
                } else {
                    renderer.print_info(&format!("Draft: {}", draft));
                }
            }
            ChatCommand::Invalid(message) => renderer.print_error(&message),
        }
        return Flow::Continue;
    }

    view.set_draft(line);
    match view.submit().await {
        Ok(true) => {}
        Ok(false) => renderer.print_info("Nothing to send."),
        Err(err) => renderer.print_error(&format!(
            "Failed to send: {}. The message is kept as your draft (see /draft).",
            err
        )),
    }
    Flow::Continue
}

/// Main entry point for the livechat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let (args, _) = ChatArgs::from_command_line_relaxed("livechat [OPTIONS]");
    let config = ChatConfig::resolve(args)?;

    let storage: Box<dyn SessionStorage> = match &config.session_path {
        Some(path) => Box::new(FileSessionStorage::new(path)),
        None => Box::new(MemorySessionStorage::new()),
    };
    let name = get_or_set_fake_name(storage.as_ref(), &mut RandomNames)?;

    let client = config.connect()?.with_logger(Arc::new(TracingClientLogger));
    let convex = Convex::new(client);

    let mut editor = DefaultEditor::new()?;
    let out: Box<dyn Write + Send> = match editor.create_external_printer() {
        Ok(printer) => Box::new(PromptWriter {
            printer,
            pending: Vec::new(),
        }),
        Err(err) => {
            tracing::debug!(error = %err, "no external printer; writing to stdout");
            Box::new(io::stdout())
        }
    };
    let mut renderer = PlainTextRenderer::with_writer(out, config.use_color);
    renderer.print_header(&name);
    renderer.print_info("Type /help for commands, /quit to exit\n");

    let shutdown = Arc::new(Notify::new());
    let on_signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || on_signal.notify_one())?;

    let scope = Scope::new();
    let scroll = Arc::new(Notify::new());
    let view = ChatView::mount(
        &convex,
        &scope,
        name,
        Arc::clone(&scroll) as Arc<dyn ScrollTarget>,
    )?;

    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    let (resume, resume_rx) = std_mpsc::channel();
    spawn_reader(editor, lines_tx, resume_rx);

    let mut cursor = TailCursor::new();
    let mut shown_error: Option<String> = None;
    loop {
        tokio::select! {
            _ = scroll.notified() => {
                match view.render_tail(&mut cursor, &mut renderer) {
                    Ok(_) => shown_error = None,
                    Err(err) => {
                        let message = err.to_string();
                        if shown_error.as_deref() != Some(message.as_str()) {
                            renderer.print_error(&message);
                            shown_error = Some(message);
                        }
                    }
                }
            }
            input = lines.recv() => match input {
                Some(Input::Line(line)) => {
                    if let Flow::Quit = handle_line(&view, line, &mut renderer).await {
                        break;
                    }
                    let _ = resume.send(());
                }
                Some(Input::Failed(err)) => {
                    eprintln!("Input error: {}", err);
                    break;
                }
                Some(Input::Eof) | None => break,
            },
            _ = shutdown.notified() => break,
        }
    }

    drop(resume);
    scope.dispose();
    println!("Goodbye!");
    Ok(())
}
