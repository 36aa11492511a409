use std::cell::RefCell;

use super::*;

use crate::config::EditorConfig;
use crate::engine::{Attachment, DecoratorNode, NodeData, PendingUpload, UploadId, UploadStatus};

#[derive(Clone, Default)]
struct RecordingTransport {
    requests: Rc<RefCell<Vec<UploadRequest>>>,
}

impl UploadTransport for RecordingTransport {
    fn start(&mut self, request: UploadRequest, _events: mpsc::UnboundedSender<UploadEvent>) {
        self.requests.borrow_mut().push(request);
    }
}

struct Rejecting;

impl EditorListener for Rejecting {
    fn file_accept(&mut self, file: &UploadFile) -> FileDecision {
        if file.content_type == "application/x-msdownload" {
            FileDecision::Reject
        } else {
            FileDecision::Accept
        }
    }
}

fn decorators(editor: &Editor) -> Vec<DecoratorNode> {
    let tree = editor.tree();
    tree.document_order()
        .into_iter()
        .filter_map(|key| match tree.data(key) {
            Some(NodeData::Decorator(decorator)) => Some(decorator.clone()),
            _ => None,
        })
        .collect()
}

fn pending(editor: &Editor) -> PendingUpload {
    decorators(editor)
        .into_iter()
        .find_map(|decorator| match decorator {
            DecoratorNode::Upload(upload) => Some(upload),
            _ => None,
        })
        .unwrap()
}

fn attachment(editor: &Editor) -> Attachment {
    decorators(editor)
        .into_iter()
        .find_map(|decorator| match decorator {
            DecoratorNode::Attachment(attachment) => Some(attachment),
            _ => None,
        })
        .unwrap()
}

fn blob(filename: &str, content_type: &str) -> UploadedBlob {
    UploadedBlob {
        signed_id: "sig".to_string(),
        attachable_sgid: Some("gid-blob".to_string()),
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        byte_size: 3,
        ..UploadedBlob::default()
    }
}

#[test]
fn the_transport_receives_the_file_and_upload_url() {
    let transport = RecordingTransport::default();
    let config = EditorConfig::default().with_direct_upload_url("/uploads");
    let mut editor = Editor::new(config);
    editor.set_upload_transport(Box::new(transport.clone()));

    let id = editor
        .upload_file(UploadFile::new("notes.txt", "text/plain", b"abc".to_vec()))
        .unwrap();

    assert_eq!(id, Some(UploadId(1)));
    let requests = transport.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].file.name, "notes.txt");
    assert_eq!(requests[0].url.as_deref(), Some("/uploads"));
    assert_eq!(pending(&editor).status, UploadStatus::Uploading);
}

#[test]
fn progress_events_update_the_pending_node() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("a.png", "image/png", vec![0; 4]))
        .unwrap()
        .unwrap();

    editor
        .upload_event_sender()
        .send(UploadEvent::Progress { id, loaded: 50, total: 200 })
        .unwrap();

    assert_eq!(editor.process_upload_events().unwrap(), 1);
    assert_eq!(pending(&editor).progress, 25);
    assert_eq!(editor.process_upload_events().unwrap(), 0);
}

#[test]
fn finished_files_use_the_templated_blob_path() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("report final.pdf", "application/pdf", vec![1, 2, 3]))
        .unwrap()
        .unwrap();

    editor
        .apply_upload_event(UploadEvent::Completed {
            id,
            blob: blob("report final.pdf", "application/pdf"),
        })
        .unwrap();

    let attachment = attachment(&editor);
    assert_eq!(
        attachment.src.as_deref(),
        Some("/rails/active_storage/blobs/sig/report%20final.pdf")
    );
    assert_eq!(attachment.sgid.as_deref(), Some("gid-blob"));
    assert!(!attachment.previewable);
    assert!(decorators(&editor)
        .iter()
        .all(|decorator| !matches!(decorator, DecoratorNode::Upload(_))));
}

#[test]
fn finished_images_point_at_the_blob_url() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("a.png", "image/png", vec![1]))
        .unwrap()
        .unwrap();

    let mut image = blob("a.png", "image/png");
    image.url = Some("https://cdn.example.com/a.png".to_string());
    editor
        .apply_upload_event(UploadEvent::Completed { id, blob: image })
        .unwrap();

    let attachment = attachment(&editor);
    assert_eq!(attachment.src.as_deref(), Some("https://cdn.example.com/a.png"));
    assert!(attachment.previewable);
}

#[test]
fn failures_are_shown_in_place() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("a.png", "image/png", vec![1]))
        .unwrap()
        .unwrap();

    editor
        .apply_upload_event(UploadEvent::Failed {
            id,
            message: "connection reset".to_string(),
        })
        .unwrap();

    assert_eq!(
        pending(&editor).status,
        UploadStatus::Failed {
            message: "Error uploading a.png".to_string()
        }
    );
}

#[test]
fn rejected_files_never_reach_the_document() {
    let transport = RecordingTransport::default();
    let mut editor = Editor::new(EditorConfig::default());
    editor.set_listener(Box::new(Rejecting));
    editor.set_upload_transport(Box::new(transport.clone()));

    let id = editor
        .upload_file(UploadFile::new("setup.exe", "application/x-msdownload", vec![1]))
        .unwrap();

    assert_eq!(id, None);
    assert!(decorators(&editor).is_empty());
    assert!(transport.requests.borrow().is_empty());
}

#[test]
fn uploads_are_refused_without_attachments() {
    let mut editor = Editor::new(EditorConfig::default().with_attachments(false));

    let ids = editor
        .upload_files(vec![UploadFile::new("a.png", "image/png", vec![1])])
        .unwrap();

    assert!(ids.is_empty());
    assert!(decorators(&editor).is_empty());
}

#[test]
fn events_for_removed_uploads_are_dropped() {
    let mut editor = Editor::new(EditorConfig::default());
    let version = editor.version();

    editor
        .apply_upload_event(UploadEvent::Progress {
            id: UploadId(99),
            loaded: 1,
            total: 2,
        })
        .unwrap();

    assert_eq!(editor.version(), version);
}

#[test]
fn the_returned_blob_decides_previews_and_dimensions() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("scan.png", "image/png", vec![1]))
        .unwrap()
        .unwrap();

    let mut converted = blob("scan.pdf", "application/pdf");
    converted.url = Some("https://cdn.example.com/scan.pdf".to_string());
    converted.width = Some(640);
    converted.height = Some(480);
    editor
        .apply_upload_event(UploadEvent::Completed { id, blob: converted })
        .unwrap();

    let attachment = attachment(&editor);
    assert!(!attachment.previewable);
    assert_eq!(attachment.width, None);
    assert_eq!(attachment.height, None);
    assert_eq!(
        attachment.src.as_deref(),
        Some("/rails/active_storage/blobs/sig/scan.pdf")
    );
}

#[test]
fn image_blobs_keep_their_dimensions() {
    let mut editor = Editor::new(EditorConfig::default());
    let id = editor
        .upload_file(UploadFile::new("a.png", "image/png", vec![1]))
        .unwrap()
        .unwrap();

    let mut image = blob("a.png", "image/png");
    image.width = Some(32);
    image.height = Some(16);
    editor
        .apply_upload_event(UploadEvent::Completed { id, blob: image })
        .unwrap();

    let attachment = attachment(&editor);
    assert_eq!((attachment.width, attachment.height), (Some(32), Some(16)));
}
