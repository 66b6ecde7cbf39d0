//! Outbound sends through one-shot relay invocations
//!
//! A send moves through validation, attachment materialization and a single
//! subprocess invocation. Materialized attachments are [`TempAttachment`]
//! guards held for the duration of the send, so they are removed on success
//! and on every failure path alike.

mod attachment;

pub use attachment::{TempAttachment, materialize};

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, warn};

use crate::relay::{CommandRunner, Invocation};
use crate::{Error, Result};

/// Recipient prefix marking a group target in the HTTP API
pub const GROUP_PREFIX: &str = "group.";

/// Relay output signature for a group send from an account without a versioned profile
const PROFILE_UPDATE_REQUIRED: &str =
    "Cannot create a V2 group as self does not have a versioned profile";

/// A message to send through the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSendRequest {
    /// Sending account
    pub sender_number: String,
    /// Message text
    pub message_body: String,
    /// Phone numbers, or the single encoded group id when `is_group_send`
    pub recipients: Vec<String>,
    /// Base64 encoded attachment payloads
    pub attachments: Vec<String>,
    /// Whether `recipients` holds a group id
    pub is_group_send: bool,
}

impl OutboundSendRequest {
    /// Split API recipients into a direct or a group send.
    ///
    /// Recipients starting with [`GROUP_PREFIX`] are group targets; they cannot
    /// be mixed with numbers and at most one is allowed.
    pub fn from_api(
        number: String,
        message: String,
        recipients: Vec<String>,
        attachments: Vec<String>,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(Error::validation(
                "Couldn't process request - please provide at least one recipient",
            ));
        }

        let (groups, numbers): (Vec<String>, Vec<String>) = recipients
            .into_iter()
            .partition(|r| r.starts_with(GROUP_PREFIX));

        if !groups.is_empty() && !numbers.is_empty() {
            return Err(Error::validation(
                "Signal Messenger Groups and phone numbers cannot be specified together in one request! Please split them up into multiple REST API calls.",
            ));
        }
        if groups.len() > 1 {
            return Err(Error::validation(
                "A signal message cannot be sent to more than one group at once! Please use multiple REST API calls for that.",
            ));
        }

        let is_group_send = !groups.is_empty();
        let recipients = if is_group_send {
            groups
                .into_iter()
                .map(|g| g[GROUP_PREFIX.len()..].to_string())
                .collect()
        } else {
            numbers
        };

        Ok(Self {
            sender_number: number,
            message_body: message,
            recipients,
            attachments,
            is_group_send,
        })
    }
}

/// Where a validated send goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// Individual recipients, in request order
    Recipients(Vec<String>),
    /// Decoded group identifier
    Group(String),
}

/// Check recipient rules and resolve the target
pub fn validate(request: &OutboundSendRequest) -> Result<SendTarget> {
    if request.recipients.is_empty() {
        return Err(Error::validation("Please specify at least one recipient"));
    }

    if !request.is_group_send {
        return Ok(SendTarget::Recipients(request.recipients.clone()));
    }

    if request.recipients.len() > 1 {
        return Err(Error::validation(
            "More than one recipient is currently not allowed",
        ));
    }

    decode_group_id(&request.recipients[0]).map(SendTarget::Group)
}

fn decode_group_id(encoded: &str) -> Result<String> {
    STANDARD
        .decode(encoded)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::validation("invalid group id"))
}

/// Build the relay arguments for a send; the message body travels on stdin
#[must_use]
pub fn compose_invocation(
    sender_number: &str,
    target: &SendTarget,
    attachment_paths: &[PathBuf],
    message_body: &str,
) -> Invocation {
    let mut args = vec![
        "--dbus-system".to_string(),
        "--username".to_string(),
        sender_number.to_string(),
        "send".to_string(),
    ];

    match target {
        SendTarget::Recipients(recipients) => args.extend(recipients.iter().cloned()),
        SendTarget::Group(group_id) => {
            args.push("-g".to_string());
            args.push(group_id.clone());
        }
    }

    if !attachment_paths.is_empty() {
        args.push("-a".to_string());
        args.extend(
            attachment_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned()),
        );
    }

    Invocation {
        args,
        stdin: message_body.to_string(),
    }
}

/// Sends messages by invoking the relay binary once per request
pub struct MessageSender {
    runner: Arc<dyn CommandRunner>,
    attachment_dir: PathBuf,
}

impl MessageSender {
    /// Create a sender materializing attachments under `attachment_dir`
    pub fn new(runner: Arc<dyn CommandRunner>, attachment_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            attachment_dir: attachment_dir.into(),
        }
    }

    /// Validate, materialize attachments, invoke the relay and clean up.
    ///
    /// The first failing attachment aborts the whole send; nothing is invoked
    /// unless every attachment was written.
    pub async fn send(&self, request: &OutboundSendRequest) -> Result<()> {
        let target = validate(request)?;

        let mut attachments = Vec::with_capacity(request.attachments.len());
        for encoded in &request.attachments {
            attachments.push(materialize(&self.attachment_dir, encoded).await?);
        }

        let paths: Vec<PathBuf> = attachments.iter().map(|a| a.path().to_path_buf()).collect();
        let invocation = compose_invocation(
            &request.sender_number,
            &target,
            &paths,
            &request.message_body,
        );

        let outcome = self.runner.run(&invocation).await;
        drop(attachments);

        match outcome {
            Ok(_) => {
                info!(
                    sender = %request.sender_number,
                    group = request.is_group_send,
                    attachments = paths.len(),
                    "Message sent"
                );
                Ok(())
            }
            Err(Error::Subprocess(output)) => {
                warn!(sender = %request.sender_number, output = %output, "Relay send failed");
                Err(classify_failure(output))
            }
            Err(e) => Err(e),
        }
    }
}

fn classify_failure(output: String) -> Error {
    if output.contains(PROFILE_UPDATE_REQUIRED) {
        Error::Subprocess(
            "Cannot send message to group - please first update your profile.".to_string(),
        )
    } else {
        Error::Subprocess(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(recipients: &[&str], is_group_send: bool) -> OutboundSendRequest {
        OutboundSendRequest {
            sender_number: "+15550001".into(),
            message_body: "hi".into(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
            attachments: Vec::new(),
            is_group_send,
        }
    }

    #[test]
    fn from_api_splits_group_prefix() {
        let group = format!("{GROUP_PREFIX}{}", STANDARD.encode("internal-group-id"));
        let req = OutboundSendRequest::from_api(
            "+1".into(),
            "m".into(),
            vec![group],
            Vec::new(),
        )
        .unwrap();
        assert!(req.is_group_send);
        assert_eq!(req.recipients, vec![STANDARD.encode("internal-group-id")]);
    }

    #[test]
    fn from_api_keeps_numbers_in_order() {
        let req = OutboundSendRequest::from_api(
            "+1".into(),
            "m".into(),
            vec!["+3".into(), "+2".into()],
            Vec::new(),
        )
        .unwrap();
        assert!(!req.is_group_send);
        assert_eq!(req.recipients, vec!["+3".to_string(), "+2".to_string()]);
    }

    #[test]
    fn from_api_rejects_mixed_and_multiple_groups() {
        let mixed = OutboundSendRequest::from_api(
            "+1".into(),
            "m".into(),
            vec!["+2".into(), "group.abc".into()],
            Vec::new(),
        );
        assert!(matches!(mixed, Err(Error::Validation(_))));

        let two_groups = OutboundSendRequest::from_api(
            "+1".into(),
            "m".into(),
            vec!["group.abc".into(), "group.def".into()],
            Vec::new(),
        );
        assert!(matches!(two_groups, Err(Error::Validation(_))));

        let empty = OutboundSendRequest::from_api("+1".into(), "m".into(), Vec::new(), Vec::new());
        assert!(matches!(empty, Err(Error::Validation(_))));
    }

    #[test]
    fn validate_rules() {
        assert!(matches!(validate(&request(&[], false)), Err(Error::Validation(_))));
        assert!(matches!(
            validate(&request(&["a", "b"], true)),
            Err(Error::Validation(_))
        ));
        match validate(&request(&["%%%"], true)) {
            Err(Error::Validation(msg)) => assert_eq!(msg, "invalid group id"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            validate(&request(&["+2", "+3"], false)).unwrap(),
            SendTarget::Recipients(vec!["+2".into(), "+3".into()])
        );
        let encoded = STANDARD.encode("grp");
        assert_eq!(
            validate(&request(&[encoded.as_str()], true)).unwrap(),
            SendTarget::Group("grp".into())
        );
    }

    #[test]
    fn compose_direct_send_with_attachments() {
        let invocation = compose_invocation(
            "+15550001",
            &SendTarget::Recipients(vec!["+2".into(), "+3".into()]),
            &[PathBuf::from("/tmp/a.png"), PathBuf::from("/tmp/b.jpg")],
            "hello",
        );
        assert_eq!(
            invocation.args,
            vec![
                "--dbus-system", "--username", "+15550001", "send", "+2", "+3", "-a",
                "/tmp/a.png", "/tmp/b.jpg",
            ]
        );
        assert_eq!(invocation.stdin, "hello");
    }

    #[test]
    fn compose_group_send_without_attachments() {
        let invocation =
            compose_invocation("+1", &SendTarget::Group("grp".into()), &[], "hello");
        assert_eq!(
            invocation.args,
            vec!["--dbus-system", "--username", "+1", "send", "-g", "grp"]
        );
    }

    #[test]
    fn profile_signature_is_translated() {
        let err = classify_failure(format!("Failed to send: {PROFILE_UPDATE_REQUIRED}."));
        assert_eq!(
            err.to_string(),
            "Cannot send message to group - please first update your profile."
        );
        assert_eq!(
            classify_failure("Invalid number".into()).to_string(),
            "Invalid number"
        );
    }
}
