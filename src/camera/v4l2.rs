use crate::camera::{CameraProvider, FrameSource};
use crate::common::config::CameraConfig;
use crate::common::{ProctorError, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
use std::fs;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<String>,
    pub can_capture: bool,
}

/// Every `/dev/videoN` that answers a capability query, sorted by index.
pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    let mut cameras = Vec::new();

    for entry in fs::read_dir("/dev")? {
        let entry = entry?;
        let name = entry.file_name();
        let index = match name
            .to_str()
            .and_then(|n| n.strip_prefix("video"))
            .and_then(|n| n.parse::<u32>().ok())
        {
            Some(index) => index,
            None => continue,
        };

        let device = match Device::new(index as usize) {
            Ok(device) => device,
            Err(_) => continue,
        };
        let caps = match device.query_caps() {
            Ok(caps) => caps,
            Err(_) => continue,
        };

        let formats = device
            .enum_formats()
            .unwrap_or_default()
            .iter()
            .map(|f| f.fourcc.str().unwrap_or("UNKNOWN").to_string())
            .collect();

        cameras.push(CameraInfo {
            index,
            name: caps.card.clone(),
            formats,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
        });
    }

    cameras.sort_by_key(|c| c.index);
    Ok(cameras)
}

pub struct V4l2CameraProvider {
    config: CameraConfig,
}

impl V4l2CameraProvider {
    pub fn new(config: &CameraConfig) -> Self {
        Self { config: config.clone() }
    }
}

impl CameraProvider for V4l2CameraProvider {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(V4l2Camera::open(index, &self.config)?))
    }
}

pub struct V4l2Camera {
    index: u32,
    // Field order matters: the stream must be torn down before the device.
    stream: Stream<'static>,
    _device: Device,
    format: v4l::Format,
}

impl V4l2Camera {
    pub fn open(index: u32, config: &CameraConfig) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|e| ProctorError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device
            .query_caps()
            .map_err(|e| ProctorError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(ProctorError::Camera(format!("/dev/video{} is not a capture device", index)));
        }

        let mut fmt = device
            .format()
            .map_err(|e| ProctorError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        if &fmt.fourcc.repr != b"GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set {}x{} on camera {}: {}", config.width, config.height, index, e);
        }

        let format = device
            .format()
            .map_err(|e| ProctorError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::debug!(
            "Camera {} ({}) format {}x{} {}",
            index,
            caps.card,
            format.width,
            format.height,
            format.fourcc.str().unwrap_or("UNKNOWN")
        );

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 4)
            .map_err(|e| ProctorError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..config.warmup_frames {
            stream
                .next()
                .map_err(|e| ProctorError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(config.warmup_delay_ms));
        }

        Ok(Self { index, stream, _device: device, format })
    }
}

impl FrameSource for V4l2Camera {
    fn read_frame(&mut self) -> Result<DynamicImage> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| ProctorError::Camera(format!("Failed to capture: {}", e)))?;

        decode_frame(&self.format.fourcc.repr, buf, self.format.width, self.format.height)
    }

    fn device_index(&self) -> u32 {
        self.index
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        tracing::debug!("Releasing camera /dev/video{}", self.index);
    }
}

fn decode_frame(fourcc: &[u8; 4], data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    match fourcc {
        b"GREY" => {
            let pixels = data
                .get(..(width * height) as usize)
                .ok_or_else(|| ProctorError::Camera("Short GREY frame".into()))?;
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ProctorError::Camera("Failed to create grayscale image buffer".into()))
        }
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        b"YUYV" => yuyv_to_rgb(data, width, height).map(DynamicImage::ImageRgb8),
        other => Err(ProctorError::Camera(format!(
            "Unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(ProctorError::Camera(format!("Short YUYV frame: {} < {}", data.len(), expected)));
    }

    let mut image = RgbImage::new(width, height);
    for (i, chunk) in data[..expected].chunks_exact(4).enumerate() {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        let pixel = (i * 2) as u32;
        for (offset, y) in [(0, y0), (1, y1)] {
            let p = pixel + offset;
            image.put_pixel(p % width, p / width, Rgb([
                (y + 1.402 * v).clamp(0.0, 255.0) as u8,
                (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
                (y + 1.772 * u).clamp(0.0, 255.0) as u8,
            ]));
        }
    }

    Ok(image)
}
