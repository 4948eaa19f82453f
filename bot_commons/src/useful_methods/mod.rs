use teloxide::types::Message;

/// Kinds of media a message can carry that are worth storing and serving back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorableMedia {
    Document,
    Photo,
    Video,
    Audio,
    Voice,
    Animation,
}

pub trait MessageStuff {
    /// What kind of storable media this message has, if any.
    fn storable_media(&self) -> Option<StorableMedia>;
    /// Split this message into a lowercase command and the rest of the text.
    /// See [`split_command`].
    fn command_and_params(&self, bot_username: &str) -> Option<(String, &str)>;
}

impl MessageStuff for Message {
    fn storable_media(&self) -> Option<StorableMedia> {
        // Animations are also sent as documents, so check them first.
        if self.animation().is_some() {
            Some(StorableMedia::Animation)
        } else if self.document().is_some() {
            Some(StorableMedia::Document)
        } else if self.photo().is_some() {
            Some(StorableMedia::Photo)
        } else if self.video().is_some() {
            Some(StorableMedia::Video)
        } else if self.audio().is_some() {
            Some(StorableMedia::Audio)
        } else if self.voice().is_some() {
            Some(StorableMedia::Voice)
        } else {
            None
        }
    }
    fn command_and_params(&self, bot_username: &str) -> Option<(String, &str)> {
        split_command(self.text()?, bot_username)
    }
}

/// Split text like `/Start@my_bot  some params` into `("/start", "some params")`.
///
/// The `@username` suffix is only stripped if it's this bot's one.
/// Returns `None` if the text is not a command at all.
pub fn split_command<'a>(text: &'a str, bot_username: &str) -> Option<(String, &'a str)> {
    if !text.starts_with('/') {
        return None;
    }

    let command = text.split_whitespace().next()?;

    if !command.is_ascii() {
        // Telegram commands must be ASCII.
        // See https://core.telegram.org/bots/api#botcommand
        return None;
    }

    let params = text[command.len()..].trim();

    let command = match command.split_once('@') {
        Some((command, username)) if username.eq_ignore_ascii_case(bot_username) => command,
        Some(_) => return None,
        None => command,
    };

    Some((command.to_lowercase(), params))
}
