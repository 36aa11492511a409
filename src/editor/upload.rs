//! File uploads: a pending node at the caret, progress from the transport,
//! then a permanent attachment or an in-place error.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Editor, FileDecision, contents::insert_at_cursor};
use crate::engine::node::is_previewable_image;
use crate::engine::{
    Attachment, DecoratorNode, NodeData, NodeKey, PendingUpload, Tree, UpdateTag, UploadFile,
    UploadId, UploadStatus,
};
use crate::error::Result;

/// What a transport is asked to send.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRequest {
    pub id: UploadId,
    pub file: UploadFile,
    pub url: Option<String>,
}

/// Remote blob metadata returned by a finished upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadedBlob {
    pub signed_id: String,
    pub attachable_sgid: Option<String>,
    pub url: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub byte_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UploadEvent {
    Progress { id: UploadId, loaded: u64, total: u64 },
    Completed { id: UploadId, blob: UploadedBlob },
    Failed { id: UploadId, message: String },
}

impl UploadEvent {
    pub fn id(&self) -> UploadId {
        match self {
            UploadEvent::Progress { id, .. }
            | UploadEvent::Completed { id, .. }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

/// Moves bytes somewhere. Implementations report back through `events`;
/// the editor applies them in [`Editor::process_upload_events`].
pub trait UploadTransport {
    fn start(&mut self, request: UploadRequest, events: mpsc::UnboundedSender<UploadEvent>);
}

fn find_upload(tree: &Tree, id: UploadId) -> Option<NodeKey> {
    tree.document_order().into_iter().find(|key| {
        matches!(
            tree.data(*key),
            Some(NodeData::Decorator(DecoratorNode::Upload(upload))) if upload.id == id
        )
    })
}

fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (loaded as f64 / total as f64 * 100.0).round();
    ratio.clamp(0.0, 100.0) as u8
}

fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Where the finished attachment points: the blob URL for previewable
/// images, the templated blob path for everything else.
pub(super) fn blob_src(upload: &PendingUpload, blob: &UploadedBlob) -> String {
    let templated = || {
        upload
            .blob_url_template
            .replace(":signed_id", &blob.signed_id)
            .replace(":filename", &encode_component(&blob.filename))
    };
    if is_previewable_image(&blob.content_type) {
        blob.url.clone().unwrap_or_else(templated)
    } else {
        templated()
    }
}

fn attachment_for(upload: &PendingUpload, blob: &UploadedBlob) -> Attachment {
    let previewable = is_previewable_image(&blob.content_type);
    let (width, height) = if previewable {
        (blob.width, blob.height)
    } else {
        (None, None)
    };
    Attachment {
        sgid: blob.attachable_sgid.clone(),
        src: Some(blob_src(upload, blob)),
        previewable,
        alt_text: Some(blob.filename.clone()),
        caption: None,
        content_type: blob.content_type.clone(),
        file_name: blob.filename.clone(),
        file_size: Some(blob.byte_size),
        width,
        height,
    }
}

impl Editor {
    /// Inserts a pending upload for `file` at the caret and hands it to the
    /// transport. Returns `None` when attachments are off or the listener
    /// rejects the file.
    pub fn upload_file(&mut self, file: UploadFile) -> Result<Option<UploadId>> {
        if !self.config.attachments {
            warn!(file = %file.name, "this editor does not accept attachments");
            return Ok(None);
        }
        if self.notify_file_accept(&file) == FileDecision::Reject {
            debug!(file = %file.name, "file rejected by listener");
            return Ok(None);
        }

        let id = UploadId(self.next_upload);
        self.next_upload += 1;
        let upload = PendingUpload {
            id,
            file: file.clone(),
            upload_url: self.config.direct_upload_url.clone(),
            blob_url_template: self.config.blob_url_template.clone(),
            progress: 0,
            status: UploadStatus::Uploading,
        };
        self.update_tagged(UpdateTag::HistoryMerge, |tx| {
            let node = tx.tree.create(NodeData::Decorator(DecoratorNode::Upload(upload)));
            insert_at_cursor(tx, node)
        })?;
        debug!(?id, file = %file.name, "upload started");

        let request = UploadRequest {
            id,
            file,
            url: self.config.direct_upload_url.clone(),
        };
        let events = self.upload_events.clone();
        if let Some(transport) = self.transport.as_mut() {
            transport.start(request, events);
        }
        Ok(Some(id))
    }

    pub fn upload_files(&mut self, files: Vec<UploadFile>) -> Result<Vec<UploadId>> {
        let mut ids = Vec::new();
        for file in files {
            if let Some(id) = self.upload_file(file)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Sender that feeds [`Editor::process_upload_events`].
    pub fn upload_event_sender(&self) -> mpsc::UnboundedSender<UploadEvent> {
        self.upload_events.clone()
    }

    /// Applies every queued upload event. Returns how many were applied.
    pub fn process_upload_events(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Ok(event) = self.upload_inbox.try_recv() {
            self.apply_upload_event(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Upload node mutations fold into the current history entry.
    pub fn apply_upload_event(&mut self, event: UploadEvent) -> Result<()> {
        let Some(key) = find_upload(self.tree(), event.id()) else {
            debug!(id = ?event.id(), "upload node is gone, dropping event");
            return Ok(());
        };
        self.update_tagged(UpdateTag::HistoryMerge, |tx| {
            let Some(NodeData::Decorator(DecoratorNode::Upload(upload))) = tx.tree.data_mut(key) else {
                return Ok(());
            };
            match event {
                UploadEvent::Progress { loaded, total, .. } => {
                    upload.progress = percent(loaded, total);
                }
                UploadEvent::Failed { message, .. } => {
                    warn!(file = %upload.file.name, %message, "upload failed");
                    upload.status = UploadStatus::Failed {
                        message: format!("Error uploading {}", upload.file.name),
                    };
                }
                UploadEvent::Completed { blob, .. } => {
                    let attachment = attachment_for(upload, &blob);
                    debug!(file = %attachment.file_name, "upload finished");
                    let node = tx
                        .tree
                        .create(NodeData::Decorator(DecoratorNode::Attachment(attachment)));
                    tx.tree.replace(key, node)?;
                }
            }
            Ok(())
        })
    }
}
