//! Lock-free stereo frame ring between the input and output callbacks.

use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type Frame = [f32; 2];

/// Create a frame ring with room for `capacity` frames.
/// Capacity should be at least 2x the device buffer size.
pub fn frame_ring(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let overrun = Arc::new(AtomicBool::new(false));
    (
        FrameProducer {
            producer,
            overrun: Arc::clone(&overrun),
        },
        FrameConsumer {
            consumer,
            capacity: capacity.max(1),
            overrun,
        },
    )
}

/// Input-callback half.
pub struct FrameProducer {
    producer: Producer<Frame>,
    overrun: Arc<AtomicBool>,
}

impl FrameProducer {
    /// Push interleaved device samples. Mono devices are duplicated to both
    /// sides; channels beyond the second are ignored.
    /// Returns true if every frame was written.
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) -> bool {
        let channels = channels.max(1);
        for chunk in data.chunks_exact(channels) {
            let left = chunk[0];
            let right = chunk.get(1).copied().unwrap_or(left);
            if self.producer.push([left, right]).is_err() {
                self.overrun.store(true, Ordering::Relaxed);
                return false;
            }
        }
        true
    }
}

/// Output-callback half.
pub struct FrameConsumer {
    consumer: Consumer<Frame>,
    capacity: usize,
    overrun: Arc<AtomicBool>,
}

impl FrameConsumer {
    /// Fill `left`/`right` with queued frames; the remainder is zeroed.
    /// Returns the number of frames actually read.
    pub fn read_into(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let mut count = 0;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            match self.consumer.pop() {
                Ok([frame_l, frame_r]) => {
                    *l = frame_l;
                    *r = frame_r;
                    count += 1;
                }
                Err(_) => {
                    *l = 0.0;
                    *r = 0.0;
                }
            }
        }
        count
    }

    /// Check if frames were dropped since the last call
    pub fn check_and_clear_overrun(&self) -> bool {
        self.overrun.swap(false, Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_write_read() {
        let (mut producer, mut consumer) = frame_ring(16);
        assert!(producer.push_interleaved(&[0.1, 0.2, 0.3, 0.4], 2));
        assert_eq!(consumer.available(), 2);

        let mut left = [9.0; 3];
        let mut right = [9.0; 3];
        assert_eq!(consumer.read_into(&mut left, &mut right), 2);
        assert_eq!(left, [0.1, 0.3, 0.0]);
        assert_eq!(right, [0.2, 0.4, 0.0]);
    }

    #[test]
    fn test_mono_and_multichannel_devices() {
        let (mut producer, mut consumer) = frame_ring(16);
        producer.push_interleaved(&[0.5, 0.6], 1);
        producer.push_interleaved(&[0.1, 0.2, 0.3, 0.4], 4);

        let mut left = [0.0; 3];
        let mut right = [0.0; 3];
        consumer.read_into(&mut left, &mut right);
        assert_eq!(left, [0.5, 0.6, 0.1]);
        assert_eq!(right, [0.5, 0.6, 0.2]);
    }

    #[test]
    fn test_overrun_detection() {
        let (mut producer, consumer) = frame_ring(4);
        assert!(producer.push_interleaved(&[1.0; 8], 2));
        assert!(!producer.push_interleaved(&[2.0; 8], 2));

        assert!(consumer.check_and_clear_overrun());
        assert!(!consumer.check_and_clear_overrun());
        assert_eq!(consumer.capacity(), 4);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let (mut producer, mut consumer) = frame_ring(4096);
        let writer = thread::spawn(move || {
            for _ in 0..100 {
                producer.push_interleaved(&[1.0; 128], 2);
            }
        });

        let reader = thread::spawn(move || {
            let mut total_read = 0;
            let mut left = [0.0; 64];
            let mut right = [0.0; 64];
            for _ in 0..100 {
                total_read += consumer.read_into(&mut left, &mut right);
                thread::sleep(std::time::Duration::from_micros(100));
            }
            total_read
        });

        writer.join().unwrap();
        let total = reader.join().unwrap();
        assert!(total > 0);
    }
}
