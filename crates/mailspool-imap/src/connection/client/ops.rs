//! Mailbox and message operations.
//!
//! Every operation follows the same shape: gate on lifecycle state,
//! serialize one command, parse to its tagged status, digest the
//! untagged data the caller cares about. The observer has already seen
//! everything by the time an operation returns, so the return values
//! here are conveniences, not the only copy.

use tokio::io::{AsyncRead, AsyncWrite};

use super::ImapClient;
use super::state::{SelectedMailbox, SessionState};
use crate::command::{Command, StatusItem, StoreAction};
use crate::error::{Error, Operation, Result};
use crate::parser::{
    BodySection, FetchResponse, ListItem, Namespace, Response, ResponseCode, StatusResponse,
};
use crate::types::{Flags, Range};

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens `mailbox` and returns the snapshot the server sent with
    /// the SELECT exchange.
    ///
    /// A rejected SELECT leaves no mailbox open, matching the server
    /// side of RFC 3501 section 6.3.1.
    pub async fn select(&mut self, mailbox: &str) -> Result<SelectedMailbox> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Select, err));
        }
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let responses = match self.run(Operation::Select, &command).await {
            Ok(responses) => responses,
            Err(err) => {
                if self.state.is_selected() && !err.poisons_connection() {
                    self.state = SessionState::Authenticated;
                }
                return Err(err);
            }
        };

        let mut selected = SelectedMailbox {
            mailbox: mailbox.to_string(),
            ..SelectedMailbox::default()
        };
        for response in &responses {
            match response {
                Response::Exists(count) => selected.exists = *count,
                Response::Recent(count) => selected.recent = *count,
                Response::Flags(flags) => selected.flags = flags.clone(),
                Response::State(status) => match &status.code {
                    Some(ResponseCode::UidValidity(value)) => {
                        selected.uid_validity = Some(*value);
                    }
                    Some(ResponseCode::UidNext(value)) => selected.uid_next = Some(*value),
                    Some(ResponseCode::Unseen(number)) => selected.unseen = Some(*number),
                    Some(ResponseCode::ReadOnly) => selected.read_only = true,
                    Some(ResponseCode::ReadWrite) => selected.read_only = false,
                    Some(ResponseCode::PermanentFlags(flags)) => {
                        selected.permanent_flags = Some(flags.clone());
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        tracing::debug!(
            mailbox = %selected.mailbox,
            exists = selected.exists,
            read_only = selected.read_only,
            "mailbox selected"
        );
        self.state = SessionState::Selected(selected.clone());
        Ok(selected)
    }

    /// Closes the selected mailbox, expunging deleted messages.
    pub async fn close(&mut self) -> Result<()> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Close, err));
        }
        self.run(Operation::Close, &Command::Close).await?;
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Pings the server; any pending untagged traffic arrives through
    /// the observer.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(Operation::Noop, &Command::Noop).await?;
        Ok(())
    }

    /// Fetches `items` for the messages in `range`.
    ///
    /// `items` is the parenthesized item list in wire syntax, e.g.
    /// `(UID FLAGS BODYSTRUCTURE)`. An empty range fetches nothing.
    pub async fn fetch(&mut self, range: &Range, items: &str) -> Result<Vec<FetchResponse>> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Fetch, err));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let command = Command::Fetch {
            range: range.clone(),
            items: items.to_string(),
        };
        let responses = self.run(Operation::Fetch, &command).await?;
        Ok(Self::fetch_data(responses))
    }

    /// Applies one flag change and returns the FETCH echoes the server
    /// sent for it.
    pub async fn store(
        &mut self,
        range: &Range,
        action: StoreAction,
    ) -> Result<Vec<FetchResponse>> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Store, err));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let command = Command::Store {
            range: range.clone(),
            action,
        };
        let responses = self.run(Operation::Store, &command).await?;
        Ok(Self::fetch_data(responses))
    }

    /// Brings the flags of `range` to `flags` for every flag named in
    /// `mask`: flags in the mask but absent from `flags` are removed
    /// first, then the present ones are added.
    pub async fn set_flags(&mut self, range: &Range, flags: &Flags, mask: &Flags) -> Result<()> {
        let removed = flags.removed(mask);
        if !removed.is_empty() {
            self.store(range, StoreAction::Remove(removed)).await?;
        }
        let added = flags.added(mask);
        if !added.is_empty() {
            self.store(range, StoreAction::Add(added)).await?;
        }
        Ok(())
    }

    /// Copies the messages in `range` to `mailbox`.
    pub async fn copy(&mut self, range: &Range, mailbox: &str) -> Result<()> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Copy, err));
        }
        if range.is_empty() {
            return Ok(());
        }
        let command = Command::Copy {
            range: range.clone(),
            mailbox: mailbox.to_string(),
        };
        self.run(Operation::Copy, &command).await?;
        Ok(())
    }

    /// Searches the selected mailbox, returning message numbers or
    /// UIDs depending on `uid`.
    ///
    /// `criteria` is in wire syntax, e.g. `UNSEEN SINCE 1-Jan-2026`.
    pub async fn search(
        &mut self,
        criteria: &str,
        charset: Option<&str>,
        uid: bool,
    ) -> Result<Vec<u32>> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Search, err));
        }
        let command = Command::Search {
            charset: charset.map(str::to_string),
            criteria: criteria.to_string(),
            uid,
        };
        let responses = self.run(Operation::Search, &command).await?;
        let mut found = Vec::new();
        for response in responses {
            if let Response::Search(numbers) = response {
                found.extend(numbers);
            }
        }
        Ok(found)
    }

    /// Expunges messages flagged `\Deleted`, returning the message
    /// numbers the server reported as gone, in server order.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        if let Err(err) = self.require_selected() {
            return Err(self.fail(Operation::Expunge, err));
        }
        let responses = self.run(Operation::Expunge, &Command::Expunge).await?;
        let mut expunged = Vec::new();
        for response in responses {
            if let Response::Expunge(number) = response {
                expunged.push(number);
            }
        }
        Ok(expunged)
    }

    /// Appends a message to `mailbox` with the given flags.
    ///
    /// The announcement and the literal payload run as one exchange:
    /// the payload is only sent after the server's `+` continuation.
    pub async fn append(&mut self, mailbox: &str, flags: Flags, message: Vec<u8>) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Append, err));
        }
        match self.append_exchange(mailbox, flags, message).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(Operation::Append, err)),
        }
    }

    async fn append_exchange(&mut self, mailbox: &str, flags: Flags, message: Vec<u8>) -> Result<()> {
        let command = Command::Append {
            mailbox: mailbox.to_string(),
            flags,
            message,
        };
        let tag = self.tags.next();
        self.send_command(&command, &tag).await?;
        let responses = self.receive(&tag, true).await?;
        if !matches!(responses.last(), Some(Response::Continue { .. })) {
            // A tagged NO/BAD surfaces as its own error; an OK without
            // ever taking the literal is the server misbehaving.
            Self::finish(responses)?;
            return Err(Error::Protocol(
                "APPEND completed without taking the literal".to_string(),
            ));
        }
        if let Command::Append { message, .. } = command {
            let mut payload = message;
            payload.extend_from_slice(b"\r\n");
            self.send_literal(&payload).await?;
        }
        let responses = self.receive(&tag, false).await?;
        Self::finish(responses)?;
        Ok(())
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListItem>> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::List, err));
        }
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let responses = self.run(Operation::List, &command).await?;
        Ok(Self::list_items(responses))
    }

    /// Lists subscribed mailboxes matching `pattern` under
    /// `reference`.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListItem>> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Lsub, err));
        }
        let command = Command::Lsub {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let responses = self.run(Operation::Lsub, &command).await?;
        Ok(Self::list_items(responses))
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Create, err));
        }
        let command = Command::Create {
            mailbox: mailbox.to_string(),
        };
        self.run(Operation::Create, &command).await?;
        Ok(())
    }

    /// Deletes a mailbox.
    pub async fn delete(&mut self, mailbox: &str) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Delete, err));
        }
        let command = Command::Delete {
            mailbox: mailbox.to_string(),
        };
        self.run(Operation::Delete, &command).await?;
        Ok(())
    }

    /// Renames a mailbox.
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Rename, err));
        }
        let command = Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.run(Operation::Rename, &command).await?;
        Ok(())
    }

    /// Subscribes to a mailbox.
    pub async fn subscribe(&mut self, mailbox: &str) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Subscribe, err));
        }
        let command = Command::Subscribe {
            mailbox: mailbox.to_string(),
        };
        self.run(Operation::Subscribe, &command).await?;
        Ok(())
    }

    /// Unsubscribes from a mailbox.
    pub async fn unsubscribe(&mut self, mailbox: &str) -> Result<()> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Unsubscribe, err));
        }
        let command = Command::Unsubscribe {
            mailbox: mailbox.to_string(),
        };
        self.run(Operation::Unsubscribe, &command).await?;
        Ok(())
    }

    /// Asks for the server's namespace layout.
    pub async fn namespace(&mut self) -> Result<Namespace> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Namespace, err));
        }
        let responses = self.run(Operation::Namespace, &Command::Namespace).await?;
        for response in responses {
            if let Response::Namespace(namespace) = response {
                return Ok(namespace);
            }
        }
        Err(self.fail(
            Operation::Namespace,
            Error::Protocol("reply carried no NAMESPACE data".to_string()),
        ))
    }

    /// Asks for counters of a mailbox without selecting it.
    pub async fn status(
        &mut self,
        mailbox: &str,
        items: &[StatusItem],
    ) -> Result<StatusResponse> {
        if let Err(err) = self.require_authenticated() {
            return Err(self.fail(Operation::Status, err));
        }
        let command = Command::Status {
            mailbox: mailbox.to_string(),
            items: items.to_vec(),
        };
        let responses = self.run(Operation::Status, &command).await?;
        for response in responses {
            if let Response::Status(status) = response {
                return Ok(status);
            }
        }
        Err(self.fail(
            Operation::Status,
            Error::Protocol("reply carried no STATUS data".to_string()),
        ))
    }

    /// Fetches whole messages, optionally without setting `\Seen`.
    pub async fn get_message(&mut self, range: &Range, peek: bool) -> Result<Vec<FetchResponse>> {
        let items = if peek { "(BODY.PEEK[])" } else { "(BODY[])" };
        self.fetch(range, items).await
    }

    /// Fetches message headers, optionally without setting `\Seen`.
    pub async fn get_header(&mut self, range: &Range, peek: bool) -> Result<Vec<FetchResponse>> {
        let items = if peek {
            "(BODY.PEEK[HEADER])"
        } else {
            "(BODY[HEADER])"
        };
        self.fetch(range, items).await
    }

    /// Fetches the body structure of each message in `range`.
    pub async fn get_body_structure(&mut self, range: &Range) -> Result<Vec<FetchResponse>> {
        self.fetch(range, "(BODYSTRUCTURE)").await
    }

    /// Fetches one body part together with its MIME header, without
    /// setting `\Seen`.
    pub async fn get_part(&mut self, range: &Range, part: &[u32]) -> Result<Vec<FetchResponse>> {
        let path = BodySection::for_part(part.to_vec());
        let items = format!("(BODY.PEEK[{path}] BODY.PEEK[{path}.MIME])");
        self.fetch(range, &items).await
    }

    /// Fetches only the MIME header of one body part.
    pub async fn get_part_mime(
        &mut self,
        range: &Range,
        part: &[u32],
    ) -> Result<Vec<FetchResponse>> {
        let path = BodySection::for_part(part.to_vec());
        let items = format!("(BODY.PEEK[{path}.MIME])");
        self.fetch(range, &items).await
    }

    /// Fetches the flags of each message in `range`.
    pub async fn get_flags(&mut self, range: &Range) -> Result<Vec<FetchResponse>> {
        self.fetch(range, "(FLAGS)").await
    }

    fn fetch_data(responses: Vec<Response>) -> Vec<FetchResponse> {
        responses
            .into_iter()
            .filter_map(|response| match response {
                Response::Fetch(fetch) => Some(fetch),
                _ => None,
            })
            .collect()
    }

    fn list_items(responses: Vec<Response>) -> Vec<ListItem> {
        responses
            .into_iter()
            .filter_map(|response| match response {
                Response::List(item) => Some(item),
                _ => None,
            })
            .collect()
    }
}
