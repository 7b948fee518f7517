use std::collections::VecDeque;
use std::io::Cursor;

use fulldome::pipeline::{self, CancelToken, FrameSink, FrameSource, PipelineOptions};
use fulldome::video::RawFrameReader;
use fulldome::{ChannelOrder, Error, ProjectionParameters, Raster, Result};

struct VecSource {
    frames: VecDeque<Result<Raster>>,
    count: Option<usize>,
    estimate: Option<usize>,
}

impl VecSource {
    fn new(frames: Vec<Raster>) -> Self {
        let count = Some(frames.len());
        VecSource {
            frames: frames.into_iter().map(Ok).collect(),
            count,
            estimate: None,
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<Raster>> {
        self.frames.pop_front().transpose()
    }

    fn frame_count(&self) -> Option<usize> {
        self.count
    }

    fn estimated_frame_count(&self) -> Option<usize> {
        self.estimate.or(self.count)
    }
}

#[derive(Default)]
struct RecordingSink {
    frames: Vec<Raster>,
    finished: usize,
    cancel_after: Option<(usize, CancelToken)>,
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, frame: &Raster) -> Result<()> {
        self.frames.push(frame.clone());
        if let Some((after, token)) = &self.cancel_after {
            if self.frames.len() >= *after {
                token.cancel();
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

/// Uniform frame whose color encodes its position in the stream. Sizes
/// alternate so that workers finish out of order.
fn numbered_frame(index: usize) -> Raster {
    let (width, height) = if index % 2 == 0 { (160, 80) } else { (16, 8) };
    Raster::from_fn(width, height, ChannelOrder::Rgb, |_, _| [index as u8, 0, 0])
}

fn center(frame: &Raster) -> [u8; 3] {
    frame.pixel(frame.width() / 2, frame.height() / 2)
}

fn options(workers: usize, queue_depth: usize) -> PipelineOptions {
    PipelineOptions {
        workers,
        queue_depth,
        strict_frames: false,
    }
}

#[test_log::test]
fn test_frames_written_in_source_order() {
    let mut source = VecSource::new((0..24).map(numbered_frame).collect());
    let mut sink = RecordingSink::default();
    let mut progress = Vec::new();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(4, 3),
        &mut |p: u8| progress.push(p),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(stats.frames_written, 24);
    assert!(!stats.cancelled);
    assert_eq!(sink.finished, 1);
    for (i, frame) in sink.frames.iter().enumerate() {
        let expected = if i % 2 == 0 { 80 } else { 8 };
        assert_eq!(frame.width(), expected);
        assert_eq!(center(frame), [i as u8, 0, 0], "frame {i}");
    }

    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&100));
}

#[test]
fn test_stops_at_reported_frame_count() {
    let mut source = VecSource::new((0..5).map(numbered_frame).collect());
    source.count = Some(3);
    let mut sink = RecordingSink::default();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |_: u8| {},
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(stats.frames_written, 3);
    assert_eq!(source.frames.len(), 2);
}

#[test]
fn test_unknown_length_reports_only_completion() {
    let mut source = VecSource::new((0..4).map(numbered_frame).collect());
    source.count = None;
    let mut sink = RecordingSink::default();
    let mut progress = Vec::new();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |p: u8| progress.push(p),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(stats.frames_written, 4);
    assert_eq!(progress, vec![100]);
}

#[test]
fn test_estimated_length_drives_progress() {
    let mut source = VecSource::new((0..4).map(numbered_frame).collect());
    source.count = None;
    source.estimate = Some(4);
    let mut sink = RecordingSink::default();
    let mut progress = Vec::new();

    pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |p: u8| progress.push(p),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(progress, vec![25, 50, 75, 99, 100]);
}

#[test]
fn test_short_estimate_neither_limits_nor_overshoots() {
    let mut source = VecSource::new((0..6).map(numbered_frame).collect());
    source.count = None;
    source.estimate = Some(2);
    let mut sink = RecordingSink::default();
    let mut progress = Vec::new();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |p: u8| progress.push(p),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(stats.frames_written, 6);
    assert_eq!(progress, vec![50, 99, 99, 99, 99, 99, 100]);
}

#[test]
fn test_source_error_ends_export() {
    let mut source = VecSource::new(vec![numbered_frame(0), numbered_frame(1)]);
    source
        .frames
        .push_back(Err(Error::Decode("corrupt packet".to_string())));
    source.frames.push_back(Ok(numbered_frame(3)));
    source.count = None;
    let mut sink = RecordingSink::default();

    let result = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |_: u8| {},
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(Error::Decode(_))));
    assert!(sink.frames.len() <= 2);
    // Written frames are still a prefix of the stream.
    for (i, frame) in sink.frames.iter().enumerate() {
        assert_eq!(center(frame), [i as u8, 0, 0]);
    }
}

#[test]
fn test_remap_error_ends_export() {
    let frames = vec![
        numbered_frame(0),
        Raster::new(8, 1, ChannelOrder::Rgb),
        numbered_frame(2),
    ];
    let mut source = VecSource::new(frames);
    let mut sink = RecordingSink::default();

    let result = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(1, 1),
        &mut |_: u8| {},
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(sink.frames.len() <= 1);
}

#[test]
fn test_invalid_parameters_rejected_before_reading() {
    let mut source = VecSource::new((0..3).map(numbered_frame).collect());
    let mut sink = RecordingSink::default();
    let params = ProjectionParameters {
        zoom_factor: -1.0,
        ..Default::default()
    };

    let result = pipeline::run(
        &mut source,
        &mut sink,
        &params,
        &options(2, 2),
        &mut |_: u8| {},
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(source.frames.len(), 3);
    assert!(sink.frames.is_empty());
}

#[test]
fn test_cancel_before_start_writes_nothing() {
    let mut source = VecSource::new((0..10).map(numbered_frame).collect());
    let mut sink = RecordingSink::default();
    let mut progress = Vec::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |p: u8| progress.push(p),
        &cancel,
    )
    .unwrap();

    assert_eq!(stats.frames_written, 0);
    assert!(stats.cancelled);
    assert_eq!(sink.finished, 1);
    assert!(progress.is_empty());
}

#[test]
fn test_cancel_mid_export_keeps_prefix() {
    let total = 200;
    let mut source = VecSource::new((0..total).map(numbered_frame).collect());
    let cancel = CancelToken::new();
    let mut sink = RecordingSink {
        cancel_after: Some((1, cancel.clone())),
        ..Default::default()
    };
    let mut progress = Vec::new();

    let stats = pipeline::run(
        &mut source,
        &mut sink,
        &ProjectionParameters::default(),
        &options(1, 1),
        &mut |p: u8| progress.push(p),
        &cancel,
    )
    .unwrap();

    assert!(stats.cancelled);
    assert!(stats.frames_written >= 1);
    assert!(stats.frames_written < total);
    assert_eq!(sink.frames.len(), stats.frames_written);
    assert_eq!(sink.finished, 1);
    for (i, frame) in sink.frames.iter().enumerate() {
        assert_eq!(center(frame), [i as u8, 0, 0]);
    }
    assert!(!progress.contains(&100));
}

#[test]
fn test_raw_stream_with_truncated_tail() {
    let (width, height) = (8, 4);
    let frame_len = width * height * 3;
    let mut bytes: Vec<u8> = (0..3).flat_map(|i| vec![i as u8 * 40; frame_len]).collect();
    bytes.extend(vec![255; frame_len / 2]);

    let mut lenient = RawFrameReader::new(
        Cursor::new(bytes.clone()),
        width,
        height,
        ChannelOrder::Rgb,
        false,
    );
    let mut sink = RecordingSink::default();
    let stats = pipeline::run(
        &mut lenient,
        &mut sink,
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |_: u8| {},
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(stats.frames_written, 3);
    assert_eq!(center(&sink.frames[2]), [80, 80, 80]);

    let mut strict = RawFrameReader::new(Cursor::new(bytes), width, height, ChannelOrder::Rgb, true);
    let result = pipeline::run(
        &mut strict,
        &mut RecordingSink::default(),
        &ProjectionParameters::default(),
        &options(2, 2),
        &mut |_: u8| {},
        &CancelToken::new(),
    );
    assert!(matches!(result, Err(Error::Decode(_))));
}
