//! Subprocess execution with streamed, framed output.
//!
//! The response body is `[header][output lines][footer]`. Header and footer
//! are HTML blocks between sentinel comments so a client can tell them apart
//! from the raw process output, and each is sent as a single chunk.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{ExitStatus, Stdio};

use futures::Stream;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::bridge::escape_html;
use crate::bridge::request::{Download, RequestToArgs};

pub const HEADER_START: &str = "<!-- CLI_WEB START HEADER -->";
pub const HEADER_END: &str = "<!-- CLI_WEB END HEADER -->";
pub const FOOTER_START: &str = "<!-- CLI_WEB START FOOTER -->";
pub const FOOTER_END: &str = "<!-- CLI_WEB END FOOTER -->";

const CHANNEL_CAPACITY: usize = 64;

/// Header and footer blocks around the process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    command_path: String,
}

impl Framing {
    pub fn new(command_path: impl Into<String>) -> Self {
        Self {
            command_path: command_path.into(),
        }
    }

    pub fn header(&self) -> String {
        [
            HEADER_START.to_string(),
            format!(
                "<div class=\"command-line\">Executing: {}</div>",
                escape_html(&self.command_path)
            ),
            HEADER_END.to_string(),
        ]
        .join("\n")
    }

    /// Links to every downloadable artifact, or a done marker.
    pub fn footer(&self, downloads: &[Download]) -> String {
        let mut lines = vec![FOOTER_START.to_string()];
        if downloads.is_empty() {
            lines.push("<b>DONE</b>".to_string());
        } else {
            lines.push("<b>Result files:</b><br>".to_string());
            lines.push("<ul>".to_string());
            for d in downloads {
                lines.push(format!(
                    "<li><a href=\"{}\">{}</a><br>",
                    escape_html(&d.url),
                    escape_html(&d.link_name)
                ));
            }
            lines.push("</ul>".to_string());
        }
        lines.push(FOOTER_END.to_string());
        format!("\n{}", lines.join("\n"))
    }

    /// Visible marker written into the body when streaming fails.
    pub fn error_marker(err: &io::Error) -> String {
        format!(
            "\nERROR: Got exception when reading output from script: {:?}\n{}\n",
            err.kind(),
            err
        )
    }
}

/// Run `argv` and stream its framed output.
///
/// `args` must already have produced `argv`, so every pre-execution hook has
/// run. Post-execution hooks run once the process has exited, before the
/// footer is sent. A failure while running the process is reported with an
/// error marker, after which the stream ends with that error.
pub fn execute(
    argv: Vec<String>,
    args: RequestToArgs,
    framing: Framing,
) -> impl Stream<Item = io::Result<String>> + Send + 'static {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let span = tracing::info_span!("execute", run_id = %uuid::Uuid::new_v4());
    tokio::spawn(run(argv, args, framing, tx).instrument(span));

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

async fn run(
    argv: Vec<String>,
    mut args: RequestToArgs,
    framing: Framing,
    tx: mpsc::Sender<io::Result<String>>,
) {
    if tx.send(Ok(framing.header())).await.is_err() {
        return;
    }

    if let Err(e) = stream_process(&argv, &tx).await {
        tracing::error!(error = %e, argv = ?argv, "process output failed");
        fail(&tx, e).await;
        return;
    }

    let hooks = tokio::task::spawn_blocking(move || {
        args.after_execution()?;
        Ok::<_, crate::Error>(args.downloads())
    })
    .await;

    match hooks {
        Ok(Ok(downloads)) => {
            let _ = tx.send(Ok(framing.footer(&downloads))).await;
        }
        Ok(Err(e)) => fail(&tx, io::Error::other(e.to_string())).await,
        Err(e) => fail(&tx, io::Error::other(e.to_string())).await,
    }
}

async fn fail(tx: &mpsc::Sender<io::Result<String>>, err: io::Error) {
    let _ = tx.send(Ok(Framing::error_marker(&err))).await;
    let _ = tx.send(Err(err)).await;
}

/// Spawn the process with stdout and stderr on one pipe and forward its
/// lines in the order they were written.
async fn stream_process(
    argv: &[String],
    tx: &mpsc::Sender<io::Result<String>>,
) -> io::Result<ExitStatus> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

    let (reader, writer) = io::pipe()?;
    // The Command and its writer ends are dropped at the end of this
    // statement, so the reader sees EOF once the child exits.
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer)
        .spawn()?;
    tracing::info!(pid = child.id(), argv = ?argv, "started process");

    let (line_tx, mut line_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || forward_lines(reader, line_tx));

    let mut client_gone = false;
    while let Some(line) = line_rx.recv().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };
        // Keep draining after a disconnect so the process can finish.
        if !client_gone && tx.send(Ok(line)).await.is_err() {
            tracing::warn!("client disconnected, discarding output");
            client_gone = true;
        }
    }

    let status = child.wait().await?;
    tracing::info!(status = %status, "process finished");
    Ok(status)
}

fn forward_lines<R: Read>(reader: R, tx: mpsc::Sender<io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::artifacts::RequestWorkspace;
    use crate::bridge::request::SubmittedForm;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn empty_args(root: &TempDir) -> RequestToArgs {
        RequestToArgs::new(&SubmittedForm::new(), RequestWorkspace::new(root.path())).unwrap()
    }

    async fn collect(stream: impl Stream<Item = io::Result<String>>) -> (Vec<String>, Option<io::Error>) {
        let mut chunks = Vec::new();
        let mut error = None;
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => error = Some(e),
            }
        }
        (chunks, error)
    }

    #[test]
    fn test_header_is_one_block() {
        let header = Framing::new("tool/echo").header();
        assert_eq!(
            header,
            "<!-- CLI_WEB START HEADER -->\n<div class=\"command-line\">Executing: tool/echo</div>\n<!-- CLI_WEB END HEADER -->"
        );
    }

    #[test]
    fn test_footer_done_without_downloads() {
        let footer = Framing::new("tool").footer(&[]);
        assert!(footer.contains(FOOTER_START));
        assert!(footer.contains("<b>DONE</b>"));
        assert!(footer.trim_end().ends_with(FOOTER_END));
    }

    #[test]
    fn test_footer_lists_downloads() {
        let downloads = vec![Download {
            link_name: "dst.zip".to_string(),
            url: "/static/results/run-1/dst.zip".to_string(),
        }];
        let footer = Framing::new("tool").footer(&downloads);
        assert!(footer.contains("<b>Result files:</b><br>"));
        assert!(footer.contains("<li><a href=\"/static/results/run-1/dst.zip\">dst.zip</a><br>"));
        assert!(!footer.contains("DONE"));
    }

    #[test]
    fn test_error_marker_names_kind() {
        let err = io::Error::new(io::ErrorKind::NotFound, "no such program");
        let marker = Framing::error_marker(&err);
        assert!(marker.contains("ERROR: Got exception when reading output from script: NotFound"));
        assert!(marker.contains("no such program"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_streams_merged_output() {
        let root = TempDir::new().unwrap();
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo out; echo err 1>&2".to_string(),
        ];
        let (chunks, error) = collect(execute(argv, empty_args(&root), Framing::new("tool"))).await;
        assert!(error.is_none());
        assert!(chunks[0].starts_with(HEADER_START));
        assert_eq!(&chunks[1..3], ["out\n", "err\n"]);
        assert!(chunks.last().unwrap().contains("<b>DONE</b>"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interleaved_stdout_stderr_keep_write_order() {
        let root = TempDir::new().unwrap();
        let script = "for i in 1 2 3 4 5 6 7 8 9 10; do echo o$i; echo e$i 1>&2; done";
        let expected: Vec<String> = (1..=10)
            .flat_map(|i| [format!("o{}\n", i), format!("e{}\n", i)])
            .collect();
        for _ in 0..10 {
            let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
            let (chunks, error) = collect(execute(argv, empty_args(&root), Framing::new("tool"))).await;
            assert!(error.is_none());
            assert_eq!(chunks.len(), expected.len() + 2);
            assert_eq!(&chunks[1..chunks.len() - 1], expected.as_slice());
        }
    }

    #[tokio::test]
    async fn test_execute_missing_program_reports_error() {
        let root = TempDir::new().unwrap();
        let argv = vec!["/nonexistent/cliweb-test-program".to_string()];
        let (chunks, error) = collect(execute(argv, empty_args(&root), Framing::new("tool"))).await;
        assert!(chunks.iter().any(|c| c.contains("ERROR: Got exception")));
        assert_eq!(error.unwrap().kind(), io::ErrorKind::NotFound);
    }
}
