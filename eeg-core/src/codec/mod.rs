mod frame;
mod reassembler;

pub use frame::*;
pub use reassembler::{ReassemblerStats, StreamReassembler};

use std::collections::VecDeque;

use bytes::BytesMut;

use crate::error::EegError;
use crate::sample::SampleVector;

/// `tokio_util` adapter so sample frames can ride a `Framed` transport.
///
/// Decoding hands every received chunk to a [`StreamReassembler`], so
/// garbage and torn frames are skipped rather than surfacing as errors.
#[derive(Default)]
pub struct EegCodec {
    reassembler: StreamReassembler,
    ready: VecDeque<SampleVector>,
}

impl EegCodec {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            reassembler: StreamReassembler::new(codec),
            ready: VecDeque::new(),
        }
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }
}

impl tokio_util::codec::Decoder for EegCodec {
    type Item = SampleVector;
    type Error = EegError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.ready.is_empty() && !src.is_empty() {
            let chunk = src.split();
            self.ready.extend(self.reassembler.feed(&chunk));
        }
        Ok(self.ready.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A torn trailing frame is not an error on this stream.
        self.decode(src)
    }
}

impl tokio_util::codec::Encoder<SampleVector> for EegCodec {
    type Error = EegError;

    fn encode(&mut self, item: SampleVector, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = self.reassembler.codec().encode(&item);
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_util::codec::{Encoder, FramedRead};

    #[tokio::test]
    async fn framed_read_over_split_reads() {
        let codec = FrameCodec::default();
        let a = codec.encode(&SampleVector::from_slices(&[10.0], &[]));
        let b = codec.encode(&SampleVector::from_slices(&[20.0], &[1.0]));

        let mock = tokio_test::io::Builder::new()
            .read(&[0xDE, 0xAD])
            .read(&a[..5])
            .read(&a[5..])
            .read(&b[..33])
            .read(&b[33..])
            .build();

        let mut reader = FramedRead::new(mock, EegCodec::default());
        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert!((first.channels[0] - 10.0).abs() <= codec.quantum());
        assert!((second.channels[0] - 20.0).abs() <= codec.quantum());
        assert!((second.labels[0] - 1.0).abs() <= codec.quantum());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn several_frames_in_one_read() {
        let codec = FrameCodec::default();
        let mut bytes = Vec::new();
        for i in 0..4 {
            bytes.extend_from_slice(&codec.encode(&SampleVector::from_slices(&[i as f64], &[])));
        }

        let mock = tokio_test::io::Builder::new().read(&bytes).build();
        let reader = FramedRead::new(mock, EegCodec::default());
        let out: Vec<_> = reader.collect().await;
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn encoder_writes_one_frame() {
        let mut codec = EegCodec::default();
        let mut dst = BytesMut::new();
        codec
            .encode(SampleVector::from_slices(&[1.0], &[]), &mut dst)
            .unwrap();
        assert_eq!(dst.len(), FRAME_LEN);
        assert_eq!(dst[..2], HEADER);
    }
}
