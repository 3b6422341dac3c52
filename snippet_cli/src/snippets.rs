use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use catalog::References;
use serde::Serialize;
use snippet::{MeasureSpan, SnippetError, TimeWindow};
use tracing::{debug, instrument, warn};

use crate::audio;

/// Settings shared by every catalog row in a run.
#[derive(Debug)]
pub struct SnippetConfig {
    pub output_folder: PathBuf,
    pub dataset_root: PathBuf,
    pub snippets_length: f64,
}

impl SnippetConfig {
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dataset_root.join(path)
        }
    }
}

#[derive(Debug, Serialize)]
struct SnippetRecord {
    index: usize,
    window: TimeWindow,
    start_seconds: f64,
    end_seconds: f64,
    audio: String,
    score: String,
    span: MeasureSpan,
    carried_forward: bool,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    audio_performance: &'a str,
    xml_score: &'a str,
    performance_annotations: &'a str,
    sample_rate: u32,
    channels: usize,
    snippets_length: f64,
    snippets: Vec<SnippetRecord>,
}

/// File stem shared by all snippets of a recording: its catalog path without extension, with
/// directories joined by underscores.
pub fn output_stem(audio_path: &str) -> String {
    Path::new(audio_path)
        .with_extension("")
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Cuts one recording and its score into snippets. Returns how many were written.
#[instrument(skip_all, fields(audio = references.audio))]
pub fn make_snippets(config: &SnippetConfig, references: &References) -> anyhow::Result<usize> {
    let annotations_path = config.resolve(references.annotations);
    let annotations = snippet::read_annotations(&annotations_path)
        .with_context(|| format!("failed to read {}", annotations_path.display()))?;
    let score_path = config.resolve(references.score);
    let score = snippet::read_score(&score_path)
        .with_context(|| format!("failed to read {}", score_path.display()))?;
    let clip = audio::load(&config.resolve(references.audio))?;
    if clip.is_empty() {
        warn!("recording decoded to no audio");
    }

    let windows = snippet::make_windows(clip.len(), clip.sample_rate, config.snippets_length);
    let buckets = snippet::bucketize(&annotations, clip.sample_rate, &windows);
    debug!(n_windows = windows.len(), "partitioned recording");

    let stem = output_stem(references.audio);
    let mut records = Vec::with_capacity(windows.len());
    for (index, window) in windows.iter().enumerate() {
        let audio_name = format!("{stem}_{index}.wav");
        let score_name = format!("{stem}_{index}.musicxml");

        clip.slice(window)
            .write_wav(&config.output_folder.join(&audio_name))?;

        let (span, carried_forward) = match snippet::locate_span(&buckets, index) {
            Ok(span) => (span, false),
            Err(SnippetError::AlignmentAmbiguity { window }) => {
                warn!(window, "no annotations inside window, reusing the open measure");
                (snippet::carry_forward(&buckets, index), true)
            }
            Err(e) => return Err(e.into()),
        };
        let trimmed = snippet::trim_score(&score, &span)
            .with_context(|| format!("failed to cut snippet {index}"))?;
        snippet::write_score(&trimmed, &config.output_folder.join(&score_name))?;

        records.push(SnippetRecord {
            index,
            window: *window,
            start_seconds: window.start_secs(clip.sample_rate),
            end_seconds: window.end_secs(clip.sample_rate),
            audio: audio_name,
            score: score_name,
            span,
            carried_forward,
        });
    }

    let manifest = Manifest {
        audio_performance: references.audio,
        xml_score: references.score,
        performance_annotations: references.annotations,
        sample_rate: clip.sample_rate,
        channels: clip.channels.len(),
        snippets_length: config.snippets_length,
        snippets: records,
    };
    let manifest_path = config.output_folder.join(format!("{stem}.json"));
    let file = std::fs::File::create(&manifest_path)
        .with_context(|| format!("failed to create {}", manifest_path.display()))?;
    serde_json::to_writer_pretty(file, &manifest)?;

    Ok(windows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioClip;

    const SCORE: &str = r#"<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration></note>
    </measure>
    <measure number="2">
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>4</duration></note>
    </measure>
    <measure number="3">
      <note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration></note>
    </measure>
  </part>
</score-partwise>
"#;

    /// 30 seconds of mono audio at 100 Hz with three four-beat measures.
    fn dataset(dir: &Path, annotations: &str) -> References<'static> {
        std::fs::create_dir_all(dir.join("Composer/Piece")).unwrap();
        AudioClip {
            sample_rate: 100,
            channels: vec![(0..3_000).map(|i| (i % 100) as f32 / 100.0).collect()],
        }
        .write_wav(&dir.join("Composer/Piece/Player01.wav"))
        .unwrap();
        std::fs::write(dir.join("Composer/Piece/score.musicxml"), SCORE).unwrap();
        std::fs::write(dir.join("Composer/Piece/Player01.txt"), annotations).unwrap();

        References {
            audio: "Composer/Piece/Player01.wav",
            score: "Composer/Piece/score.musicxml",
            annotations: "Composer/Piece/Player01.txt",
        }
    }

    fn beat_track(times: &[f64], per_measure: usize) -> String {
        times
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let label = if i % per_measure == 0 { "db" } else { "b" };
                format!("{t}\t{t}\t{label}\n")
            })
            .collect()
    }

    fn config(root: &Path, output: &Path, snippets_length: f64) -> SnippetConfig {
        SnippetConfig {
            output_folder: output.to_path_buf(),
            dataset_root: root.to_path_buf(),
            snippets_length,
        }
    }

    #[test]
    fn stem_joins_directories() {
        assert_eq!(
            output_stem("Bach/Fugue/bwv_846/Shi05M.wav"),
            "Bach_Fugue_bwv_846_Shi05M"
        );
        assert_eq!(output_stem("recording.flac"), "recording");
    }

    #[test]
    fn writes_one_audio_and_one_score_per_window() {
        let root = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let times: Vec<f64> = (0..12).map(|i| i as f64 * 2.5).collect();
        let references = dataset(root.path(), &beat_track(&times, 4));

        let written =
            make_snippets(&config(root.path(), output.path(), 10.0), &references).unwrap();
        assert_eq!(written, 3);

        for index in 0..3 {
            let audio = audio::load(
                &output
                    .path()
                    .join(format!("Composer_Piece_Player01_{index}.wav")),
            )
            .unwrap();
            assert_eq!(audio.len(), 1_000);
            assert_eq!(audio.sample_rate, 100);

            let score = snippet::read_score(
                &output
                    .path()
                    .join(format!("Composer_Piece_Player01_{index}.musicxml")),
            )
            .unwrap();
            assert_eq!(score.measure_count(), 1);
            assert_eq!(score.parts[0].measures[0].ordinal, 1);
        }

        let manifest: serde_json::Value = serde_json::from_reader(
            std::fs::File::open(output.path().join("Composer_Piece_Player01.json")).unwrap(),
        )
        .unwrap();
        let snippets = manifest["snippets"].as_array().unwrap();
        assert_eq!(snippets.len(), 3);
        assert_eq!(snippets[1]["span"]["start_measure"], 2);
        assert_eq!(snippets[1]["span"]["start_beat"], 1);
        assert_eq!(snippets[2]["window"]["start"], 2_000);
    }

    #[test]
    fn window_without_annotations_carries_the_open_measure() {
        let root = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let references = dataset(root.path(), &beat_track(&[0.0, 2.5, 5.0, 7.5, 10.0], 4));

        make_snippets(&config(root.path(), output.path(), 10.0), &references).unwrap();

        let manifest: serde_json::Value = serde_json::from_reader(
            std::fs::File::open(output.path().join("Composer_Piece_Player01.json")).unwrap(),
        )
        .unwrap();
        let last = &manifest["snippets"][2];
        assert_eq!(last["carried_forward"], true);
        assert_eq!(last["span"]["start_measure"], 2);
        assert_eq!(last["span"]["end_measure"], 2);
        assert_eq!(manifest["snippets"][1]["carried_forward"], false);
    }

    #[test]
    fn malformed_annotations_fail_the_row() {
        let root = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let references = dataset(root.path(), "0.0\tdb\n");

        let err = make_snippets(&config(root.path(), output.path(), 10.0), &references)
            .unwrap_err();
        assert!(err.downcast_ref::<SnippetError>().is_some());
        assert!(!output.path().join("Composer_Piece_Player01_0.wav").exists());
    }
}
