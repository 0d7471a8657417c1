use std::collections::HashSet;

use crate::error::{ProjectError, Result};
use crate::project::types::{Outline, Shot};

/// Artifact stems the shot compositor writes next to layer artifacts
pub const RESERVED_IDS: &[&str] = &["shot", "mix"];

impl Outline {
    /// Check the tree before any render work starts
    ///
    /// Ids become directory and file names, so they are restricted to ASCII
    /// alphanumerics, `-` and `_`. Layer ids key the render cache and must be
    /// unique across the whole project.
    pub fn validate(&self) -> Result<()> {
        check_id(&self.id)?;

        let mut layer_ids = HashSet::new();
        check_siblings(self.sequences.iter().map(|s| s.id.as_str()))?;
        for sequence in &self.sequences {
            check_id(&sequence.id)?;
            check_siblings(sequence.scenes.iter().map(|s| s.id.as_str()))?;
            for scene in &sequence.scenes {
                check_id(&scene.id)?;
                check_siblings(scene.shots.iter().map(|s| s.id.as_str()))?;
                for shot in &scene.shots {
                    validate_shot(shot, &mut layer_ids)?;
                }
            }
        }

        Ok(())
    }
}

fn validate_shot<'a>(shot: &'a Shot, layer_ids: &mut HashSet<&'a str>) -> Result<()> {
    check_id(&shot.id)?;

    if !shot.has_video_layer() {
        return Err(ProjectError::MissingVideoLayer { shot_id: shot.id.clone() }.into());
    }

    for layer in &shot.layers {
        check_id(&layer.id)?;

        if RESERVED_IDS.contains(&layer.id.as_str()) {
            return Err(ProjectError::InvalidId {
                id: layer.id.clone(),
                reason: "reserved for shot artifacts".to_string(),
            }
            .into());
        }

        if !layer_ids.insert(layer.id.as_str()) {
            return Err(ProjectError::DuplicateLayerId { id: layer.id.clone() }.into());
        }

        if let Some(duration) = layer.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(ProjectError::InvalidDuration {
                    id: layer.id.clone(),
                    duration,
                }
                .into());
            }
        }
    }

    Ok(())
}

/// Siblings share a parent directory, so their ids must differ
fn check_siblings<'a>(ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ProjectError::InvalidId {
                id: id.to_string(),
                reason: "used by two siblings".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ProjectError::InvalidId {
            id: id.to_string(),
            reason: "empty".to_string(),
        }
        .into());
    }

    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ProjectError::InvalidId {
            id: id.to_string(),
            reason: format!("character {:?} is not allowed", bad),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use crate::project::types::*;

    fn video(id: &str) -> Layer {
        Layer::new(
            id,
            LayerKind::Video(VideoLayer {
                prompt: "a castle".to_string(),
                positive_prompt: String::new(),
                negative_prompt: String::new(),
                model: "sd-base".to_string(),
                seed: 42,
                width: 768,
                height: 432,
            }),
        )
    }

    fn music(id: &str) -> Layer {
        Layer::new(id, LayerKind::Music(MusicLayer { prompt: "calm".to_string() }))
    }

    fn outline_of(shots: Vec<Shot>) -> Outline {
        Outline::new(
            "O1",
            vec![Sequence::new("Q1", vec![Scene::new("C1", shots)])],
        )
    }

    #[test]
    fn test_valid_tree() {
        let outline = outline_of(vec![
            Shot::new("H1", vec![video("a"), music("b")]),
            Shot::new("H2", vec![video("c")]),
        ]);
        assert!(outline.validate().is_ok());
    }

    #[test]
    fn test_shot_without_video_layer() {
        let outline = outline_of(vec![Shot::new("H9", vec![music("m")])]);
        match outline.validate() {
            Err(CompositorError::Project(ProjectError::MissingVideoLayer { shot_id })) => {
                assert_eq!(shot_id, "H9");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_layer_ids_across_shots() {
        let outline = outline_of(vec![
            Shot::new("H1", vec![video("same")]),
            Shot::new("H2", vec![video("same")]),
        ]);
        assert!(matches!(
            outline.validate(),
            Err(CompositorError::Project(ProjectError::DuplicateLayerId { .. }))
        ));
    }

    #[test]
    fn test_ids_must_be_file_safe() {
        let outline = outline_of(vec![Shot::new("../escape", vec![video("a")])]);
        assert!(outline.validate().is_err());

        let outline = outline_of(vec![Shot::new("H1", vec![video("shot")])]);
        assert!(outline.validate().is_err());
    }

    #[test]
    fn test_sibling_shots_need_distinct_ids() {
        let outline = outline_of(vec![
            Shot::new("H1", vec![video("a")]),
            Shot::new("H1", vec![video("b")]),
        ]);
        assert!(matches!(
            outline.validate(),
            Err(CompositorError::Project(ProjectError::InvalidId { .. }))
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let outline = outline_of(vec![Shot::new("H1", vec![video("a").with_duration(-1.0)])]);
        assert!(matches!(
            outline.validate(),
            Err(CompositorError::Project(ProjectError::InvalidDuration { .. }))
        ));
    }
}
