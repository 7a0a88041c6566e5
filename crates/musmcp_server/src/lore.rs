//! Static cheat sheets served as MCP resources.

use crate::protocol::{ResourceContents, ResourceDescriptor};

const MARKDOWN: &str = "text/markdown";

struct Lore {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    text: &'static str,
}

const LORE: &[Lore] = &[
    Lore {
        uri: "lore://sound_design",
        name: "sound_design",
        description: "Parameter ranges for basses, pads and leads with synthesize_sawtooth_lead_bass.",
        text: include_str!("../lore/sound_design.md"),
    },
    Lore {
        uri: "lore://drum_design",
        name: "drum_design",
        description: "Kick drum presets for synthesize_kick_drum.",
        text: include_str!("../lore/drum_design.md"),
    },
];

pub fn list() -> Vec<ResourceDescriptor> {
    LORE.iter()
        .map(|lore| ResourceDescriptor {
            uri: lore.uri.to_string(),
            name: lore.name.to_string(),
            description: lore.description.to_string(),
            mime_type: MARKDOWN.to_string(),
        })
        .collect()
}

pub fn read(uri: &str) -> Option<ResourceContents> {
    LORE.iter().find(|lore| lore.uri == uri).map(|lore| ResourceContents {
        uri: lore.uri.to_string(),
        mime_type: MARKDOWN.to_string(),
        text: lore.text.to_string(),
    })
}
