//! Built-in game messages.
//!
//! Inbound messages arrive from clients addressed to an object; outbound
//! messages are broadcast by the server to the observers of an object.

use replica_codec::{schema, ObjectId, WString};

use super::{Message, MessageKind};

pub const REQUEST_SMASH: u16 = 38;
pub const DIE: u16 = 37;
pub const REQUEST_RESURRECT: u16 = 159;
pub const RESURRECT: u16 = 160;
pub const PLAY_EMOTE: u16 = 121;
pub const EMOTE_PLAYED: u16 = 122;
pub const PARSE_CHAT_MESSAGE: u16 = 850;
pub const DISPLAY_CHAT_MESSAGE: u16 = 851;

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct RequestSmash {
        pub killer: ObjectId = ObjectId(0),
    }
}

impl Message for RequestSmash {
    const ROUTE: MessageKind = MessageKind::Game { message_id: REQUEST_SMASH };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Die {
        pub killer: ObjectId = ObjectId(0),
        pub spawn_loot: bool,
    }
}

impl Message for Die {
    const ROUTE: MessageKind = MessageKind::Game { message_id: DIE };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct RequestResurrect {}
}

impl Message for RequestResurrect {
    const ROUTE: MessageKind = MessageKind::Game { message_id: REQUEST_RESURRECT };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Resurrect {
        pub immediate: bool,
    }
}

impl Message for Resurrect {
    const ROUTE: MessageKind = MessageKind::Game { message_id: RESURRECT };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct PlayEmote {
        pub emote_id: i32,
        pub target: ObjectId = ObjectId(0),
    }
}

impl Message for PlayEmote {
    const ROUTE: MessageKind = MessageKind::Game { message_id: PLAY_EMOTE };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct EmotePlayed {
        pub emote_id: i32,
        pub target: ObjectId = ObjectId(0),
    }
}

impl Message for EmotePlayed {
    const ROUTE: MessageKind = MessageKind::Game { message_id: EMOTE_PLAYED };
}

schema! {
    /// Chat line typed by a player; lines starting with a command prefix are
    /// executed as chat commands.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct ParseChatMessage {
        pub client_state: i32 = 0,
        pub text: WString,
    }
}

impl Message for ParseChatMessage {
    const ROUTE: MessageKind = MessageKind::Game { message_id: PARSE_CHAT_MESSAGE };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct DisplayChatMessage {
        pub text: WString,
    }
}

impl Message for DisplayChatMessage {
    const ROUTE: MessageKind = MessageKind::Game { message_id: DISPLAY_CHAT_MESSAGE };
}
