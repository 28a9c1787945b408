//! Text-to-speech stage.

use async_trait::async_trait;
use tracing::debug;

use seqrelay_types::error::StageError;
use seqrelay_types::event::SpeechClip;
use seqrelay_types::sequence::SequenceNumber;

use super::latency::LatencyModel;
use crate::pipeline::Stage;

/// Synthesizes a placeholder clip whose audio is `SPEECH_<text>`.
pub struct TextToSpeech {
    latency: LatencyModel,
}

impl TextToSpeech {
    pub fn new(latency: LatencyModel) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Stage<String, SpeechClip> for TextToSpeech {
    fn name(&self) -> &str {
        "text_to_speech"
    }

    async fn process(&self, seq: SequenceNumber, text: String) -> Result<SpeechClip, StageError> {
        if self.latency.simulate().await {
            return Err(StageError::Processing("speech synthesis failed".into()));
        }
        let audio = format!("SPEECH_{text}").into_bytes();
        debug!(seq, bytes = audio.len(), "speech synthesized");
        Ok(SpeechClip { text, audio })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn audio_is_prefixed_text() {
        let stage = TextToSpeech::new(LatencyModel::fixed(Duration::ZERO));
        let clip = stage.process(3, "kickoff".into()).await.unwrap();
        assert_eq!(clip.text, "kickoff");
        assert_eq!(clip.audio, b"SPEECH_kickoff");
    }
}
