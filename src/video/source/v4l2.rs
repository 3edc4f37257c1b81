//! V4L2 capture stream shared by the hardware sources

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::capture::Parameters;
use v4l::video::Capture;

use crate::video::format::{PixelFormat, Resolution};

/// Memory-mapped V4L2 capture stream with a fixed format
pub struct V4l2Stream {
    path: PathBuf,
    resolution: Resolution,
    format: PixelFormat,
    stream: Stream<'static>,
    // Keeps the fd alive for the lifetime of the stream
    _device: Device,
}

impl V4l2Stream {
    /// Open `path` and start streaming at the requested format.
    ///
    /// Fails if the driver does not accept the pixel format or silently
    /// substitutes a different resolution.
    pub fn open(
        path: impl AsRef<Path>,
        resolution: Resolution,
        format: PixelFormat,
        fps: u32,
        buffer_count: u32,
        timeout: Duration,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening video device: {:?}", path);

        let device = Device::with_path(&path)?;

        let mut fmt = device.format()?;
        fmt.width = resolution.width;
        fmt.height = resolution.height;
        fmt.fourcc = format.to_fourcc();
        let actual = device.set_format(&fmt)?;

        let actual_format = PixelFormat::from_fourcc(actual.fourcc).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("driver selected unsupported format {}", actual.fourcc),
            )
        })?;
        if actual_format != format {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("requested {}, driver selected {}", format, actual_format),
            ));
        }

        let actual_resolution = Resolution::new(actual.width, actual.height);
        if actual_resolution != resolution {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("requested {}, driver selected {}", resolution, actual_resolution),
            ));
        }

        if fps > 0 {
            if let Err(e) = device.set_params(&Parameters::with_fps(fps)) {
                warn!("Failed to set hardware FPS: {}", e);
            }
        }

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, buffer_count.max(1))?;
        stream.set_timeout(timeout);

        info!(
            "Capture format: {:?} {} {} @ {}fps",
            path, actual_resolution, actual_format, fps
        );

        Ok(Self {
            path,
            resolution: actual_resolution,
            format: actual_format,
            stream,
            _device: device,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Dequeue one frame, copying out exactly one full image
    pub fn next_frame(&mut self) -> io::Result<Bytes> {
        let expected = self.format.frame_size(self.resolution);
        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short frame: {} of {} bytes", used, expected),
            ));
        }
        Ok(Bytes::copy_from_slice(&buf[..expected]))
    }
}
