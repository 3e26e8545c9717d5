//! Queue-file submitter tests.

use crate::common::create_temp_dir;
use mailgate::core::verify::{ProbeSubmitter, QueueSubmitter};

fn queue_files(incoming: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(incoming)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn probe_lands_in_incoming_with_envelope() {
    let dir = create_temp_dir();
    let submitter = QueueSubmitter::new(dir.path());
    submitter.submit_probe("postmaster", "u@x").await.unwrap();

    let files = queue_files(&dir.path().join("incoming"));
    assert_eq!(files.len(), 1);

    let envelope = std::fs::read_to_string(&files[0]).unwrap();
    assert!(envelope.contains("sender=postmaster\n"));
    assert!(envelope.contains("recipient=u@x\n"));
    assert!(envelope.contains("flags=verify\n"));
    assert!(envelope.contains("rewrite=none\n"));
}

#[tokio::test]
async fn null_sender_is_rendered_as_angle_brackets() {
    let dir = create_temp_dir();
    let submitter = QueueSubmitter::new(dir.path());
    submitter.submit_probe("", "u@x").await.unwrap();

    let files = queue_files(&dir.path().join("incoming"));
    let envelope = std::fs::read_to_string(&files[0]).unwrap();
    assert!(envelope.starts_with("sender=<>\n"));
}

#[tokio::test]
async fn each_probe_gets_a_distinct_queue_file() {
    let dir = create_temp_dir();
    let submitter = QueueSubmitter::new(dir.path());
    submitter.submit_probe("postmaster", "a@x").await.unwrap();
    submitter.submit_probe("postmaster", "b@x").await.unwrap();

    let files = queue_files(&dir.path().join("incoming"));
    assert_eq!(files.len(), 2);
    // No temp files left behind once submissions have returned.
    assert!(files
        .iter()
        .all(|path| path.extension().map(|ext| ext != "tmp").unwrap_or(true)));
}
