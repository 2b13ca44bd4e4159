//! Decoding songs and scoring them.

use midi_notes::Song;
use serde::Serialize;
use tracing::{debug, info};
use voice_split::{
    aggregate, evaluate, EvaluationReport, ModelParameters, Note, SearchLimits, SearchStats,
    SongScore, VoiceSplitter,
};

/// The outcome of splitting one song.
#[derive(Debug, Clone, Serialize)]
pub struct Decoded {
    pub name: String,
    /// Lowest voice first, each in onset order.
    pub voices: Vec<Vec<Note>>,
    /// Per voice, how many notes carry its most common true label.
    pub consistent_counts: Vec<usize>,
    pub score: SongScore,
    pub stats: SearchStats,
}

/// Split one song and score it against its labels.
pub fn decode(
    song: &Song,
    params: &ModelParameters,
    limits: &SearchLimits,
) -> voice_split::Result<Decoded> {
    let mut splitter = VoiceSplitter::with_limits(params.clone(), limits.clone())?;
    splitter.run(song.onset_groups());

    let best = splitter.best_hypothesis()?;
    let score = evaluate(best.voices(), &song.gold);
    debug!(
        song = %song.name,
        voices = best.voice_count(),
        log_prob = best.score(),
        f1 = score.f1,
        "decoded"
    );

    Ok(Decoded {
        name: song.name.clone(),
        voices: best.voice_notes(),
        consistent_counts: best
            .voices()
            .iter()
            .map(|voice| voice.majority_label_count())
            .collect(),
        score,
        stats: splitter.stats().clone(),
    })
}

/// Score one parameter set over a corpus; the first failing song fails it.
pub fn evaluate_corpus(
    songs: &[Song],
    params: &ModelParameters,
    limits: &SearchLimits,
) -> voice_split::Result<EvaluationReport> {
    let scores = songs
        .iter()
        .map(|song| decode(song, params, limits).map(|decoded| decoded.score))
        .collect::<voice_split::Result<Vec<_>>>()?;
    let report = aggregate(&scores);
    info!(%params, f1 = report.f1, "evaluated parameters");
    Ok(report)
}
