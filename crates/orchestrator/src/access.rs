//! Access predicates: who the bot answers, and which chats it stays in.
//!
//! The bot is personal. It answers its configured admin only; in groups it
//! additionally requires a mention or a reply to one of its own messages.
//! When someone other than the admin adds it to a chat, it leaves.

use telegram::{ChatMemberUpdated, Message};

/// Is this user id the configured admin?
pub fn is_admin(user_id: Option<i64>, admin_id: i64) -> bool {
    user_id == Some(admin_id)
}

/// Is this chat type a group chat?
pub fn is_group_chat(chat_kind: &str) -> bool {
    matches!(chat_kind, "group" | "supergroup")
}

/// Does the text mention the bot's username (case-insensitive)?
pub fn is_mention(text: Option<&str>, bot_username: Option<&str>) -> bool {
    match (text, bot_username) {
        (Some(text), Some(username)) => text
            .to_lowercase()
            .contains(&format!("@{}", username.to_lowercase())),
        _ => false,
    }
}

/// Is this message a reply to one of the bot's own messages?
pub fn is_reply_to_bot(message: &Message, bot_username: Option<&str>) -> bool {
    let Some(username) = bot_username else {
        return false;
    };
    message
        .reply_to_message
        .as_deref()
        .and_then(|replied| replied.from.as_ref())
        .map(|from| from.username.as_deref() == Some(username))
        .unwrap_or(false)
}

/// Should the bot respond to this message?
pub fn should_respond(message: &Message, bot_username: Option<&str>, admin_id: i64) -> bool {
    let sender_id = message.from.as_ref().map(|u| u.id);
    if !is_admin(sender_id, admin_id) {
        return false;
    }

    if is_group_chat(&message.chat.kind) {
        return is_mention(message.text.as_deref(), bot_username)
            || is_reply_to_bot(message, bot_username);
    }

    true
}

/// Membership statuses that mean the bot is present in the chat.
///
/// "left"/"kicked" events are not membership and are ignored entirely.
pub fn is_joined_status(status: &str) -> bool {
    matches!(status, "member" | "administrator")
}

/// Should the bot leave the chat after this membership change?
pub fn should_leave_chat(event: &ChatMemberUpdated, admin_id: i64) -> bool {
    !is_admin(event.from.as_ref().map(|u| u.id), admin_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telegram::{Chat, ChatMember, TgUser};

    const ADMIN_ID: i64 = 100013433;

    fn user(id: i64) -> TgUser {
        TgUser {
            id,
            is_bot: false,
            username: Some("someone".to_string()),
            first_name: None,
        }
    }

    fn message(from_id: i64, chat_kind: &str, text: &str) -> Message {
        Message {
            message_id: 1,
            from: Some(user(from_id)),
            chat: Chat {
                id: 10,
                kind: chat_kind.to_string(),
                title: None,
            },
            text: Some(text.to_string()),
            reply_to_message: None,
        }
    }

    #[test]
    fn test_is_mention_case_insensitive() {
        assert!(is_mention(Some("Hi @MyBot"), Some("mybot")));
    }

    #[test]
    fn test_is_mention_missing_text_or_username() {
        assert!(!is_mention(None, Some("mybot")));
        assert!(!is_mention(Some("hello"), None));
    }

    #[test]
    fn test_is_reply_to_bot_requires_username_match() {
        let mut msg = message(ADMIN_ID, "group", "yes");
        msg.reply_to_message = Some(Box::new(Message {
            message_id: 0,
            from: Some(TgUser {
                id: 1,
                is_bot: true,
                username: Some("mybot".to_string()),
                first_name: None,
            }),
            chat: msg.chat.clone(),
            text: None,
            reply_to_message: None,
        }));

        assert!(is_reply_to_bot(&msg, Some("mybot")));
        assert!(!is_reply_to_bot(&msg, Some("otherbot")));
    }

    #[test]
    fn test_is_reply_to_bot_no_reply_or_username() {
        let msg = message(ADMIN_ID, "group", "yes");
        assert!(!is_reply_to_bot(&msg, Some("mybot")));
        assert!(!is_reply_to_bot(&msg, None));
    }

    #[test]
    fn test_non_admin_never_gets_a_reply() {
        let msg = message(999, "private", "hello");
        assert!(!should_respond(&msg, Some("mybot"), ADMIN_ID));
    }

    #[test]
    fn test_admin_in_private_chat() {
        let msg = message(ADMIN_ID, "private", "hello");
        assert!(should_respond(&msg, Some("mybot"), ADMIN_ID));
    }

    #[test]
    fn test_admin_in_group_needs_mention_or_reply() {
        let plain = message(ADMIN_ID, "group", "hello everyone");
        assert!(!should_respond(&plain, Some("mybot"), ADMIN_ID));

        let mentioned = message(ADMIN_ID, "supergroup", "hey @mybot, hi");
        assert!(should_respond(&mentioned, Some("mybot"), ADMIN_ID));

        let mut replied = message(ADMIN_ID, "group", "continue");
        replied.reply_to_message = Some(Box::new(Message {
            message_id: 0,
            from: Some(TgUser {
                id: 1,
                is_bot: true,
                username: Some("mybot".to_string()),
                first_name: None,
            }),
            chat: replied.chat.clone(),
            text: None,
            reply_to_message: None,
        }));
        assert!(should_respond(&replied, Some("mybot"), ADMIN_ID));
    }

    #[test]
    fn test_message_without_sender() {
        let mut msg = message(ADMIN_ID, "private", "hello");
        msg.from = None;
        assert!(!should_respond(&msg, Some("mybot"), ADMIN_ID));
    }

    #[test]
    fn test_should_leave_chat_for_non_admin_actor() {
        let event = ChatMemberUpdated {
            chat: Chat {
                id: 55,
                kind: "group".to_string(),
                title: None,
            },
            from: Some(user(999)),
            new_chat_member: ChatMember {
                status: "member".to_string(),
                user: None,
            },
        };
        assert!(should_leave_chat(&event, ADMIN_ID));

        let by_admin = ChatMemberUpdated {
            from: Some(user(ADMIN_ID)),
            ..event
        };
        assert!(!should_leave_chat(&by_admin, ADMIN_ID));
    }

    #[test]
    fn test_joined_statuses() {
        assert!(is_joined_status("member"));
        assert!(is_joined_status("administrator"));
        assert!(!is_joined_status("left"));
        assert!(!is_joined_status("kicked"));
        assert!(!is_joined_status("restricted"));
    }
}
