//! Audio codec discovery from `/proc/asound`.

use std::path::Path;

/// Read codec names from `<root>/card*/codec#*`, falling back to `card*/id` hints.
pub fn read_audio_codecs(root: &Path) -> Vec<String> {
    let mut codecs = Vec::new();
    let cards = match std::fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("card"))
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            log::warn!("Cannot read {}: {}", root.display(), e);
            return codecs;
        }
    };
    let mut cards = cards;
    cards.sort();

    for card in &cards {
        let Ok(entries) = std::fs::read_dir(card) else { continue };
        let mut codec_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("codec#"))
            })
            .collect();
        codec_files.sort();
        for file in codec_files {
            if let Ok(content) = std::fs::read_to_string(&file) {
                if let Some(name) = parse_codec_file(&content) {
                    push_unique(&mut codecs, name);
                }
            }
        }
    }

    if codecs.is_empty() {
        // Heuristic only: card ids rarely name the exact codec.
        for card in &cards {
            if let Ok(id) = std::fs::read_to_string(card.join("id")) {
                if let Some(hint) = codec_hint_from_card_id(&id) {
                    push_unique(&mut codecs, hint);
                }
            }
        }
    }

    if codecs.is_empty() {
        log::warn!("No audio codecs detected under {}", root.display());
    }
    codecs
}

/// The `Codec: <name>` line of a `codec#N` file.
pub fn parse_codec_file(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        line.strip_prefix("Codec:")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// A card id that looks like a codec family (`ALC`, `CS`, `AD`).
pub fn codec_hint_from_card_id(id: &str) -> Option<String> {
    let id = id.trim();
    ["ALC", "CS", "AD"]
        .iter()
        .any(|family| id.contains(family))
        .then(|| id.to_string())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_codec_line() {
        let content = "Codec: Realtek ALC897\nAddress: 0\nAFG Function Id: 0x1 (unsol 1)\n";
        assert_eq!(parse_codec_file(content).as_deref(), Some("Realtek ALC897"));
        assert_eq!(parse_codec_file("Address: 2\n"), None);
    }

    #[test]
    fn card_id_hint_is_substring_based() {
        assert_eq!(codec_hint_from_card_id("ALC1220\n").as_deref(), Some("ALC1220"));
        assert_eq!(codec_hint_from_card_id("NVidia"), None);
    }

    #[test]
    fn falls_back_to_card_ids_when_no_codec_files() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("card0");
        std::fs::create_dir_all(&card).unwrap();
        std::fs::write(card.join("id"), "CS4206\n").unwrap();
        assert_eq!(read_audio_codecs(dir.path()), vec!["CS4206".to_string()]);

        std::fs::write(card.join("codec#0"), "Codec: Realtek ALC1220\n").unwrap();
        assert_eq!(read_audio_codecs(dir.path()), vec!["Realtek ALC1220".to_string()]);
    }
}
