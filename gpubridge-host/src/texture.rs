//! Host-initiated texture loads.
//!
//! The embedder hands over an encoded image for a device the guest already
//! holds. It is decoded off the import path and uploaded as a 2D rgba8unorm
//! texture; the texture and a default view arrive through
//! `on_texture_loaded(texture, view, status)` on a later pump.

use futures::future;
use gpubridge_abi::{CallbackStatus, Handle, ResourceKind, NULL_HANDLE};

use crate::async_bridge::Completion;
use crate::audio::AudioBackend;
use crate::backend::{BackendResult, DecodedImage, GpuBackend, TextureViewDescriptor};
use crate::error::{BackendError, BridgeError};
use crate::host::{lookup, Host, Settled};

/// Entry name used in error-channel messages.
pub(crate) const LOAD_TEXTURE: &str = "load_texture";

/// Decode a PNG or PNM image into tightly packed RGBA8.
pub(crate) fn decode_image(encoded: &[u8]) -> BackendResult<DecodedImage> {
    let image = image::load_from_memory(encoded)
        .map_err(|e| BackendError::native(format!("failed to decode image: {e}")))?
        .to_rgba8();
    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

impl<G: GpuBackend, A: AudioBackend> Host<G, A> {
    /// Start loading `encoded` onto `device`. Exactly one
    /// `on_texture_loaded` callback follows, with handle 0 for both objects
    /// if the device is invalid or the image cannot be decoded or uploaded.
    pub fn load_texture(&mut self, device: Handle, encoded: Vec<u8>) {
        if let Err(err) = lookup(&self.objects.devices, ResourceKind::Device, device) {
            self.report(LOAD_TEXTURE, &err);
            self.tasks
                .spawn(future::ready(Settled::Rejected(Completion::TextureLoaded {
                    texture: NULL_HANDLE,
                    view: NULL_HANDLE,
                    status: CallbackStatus::Failed,
                })));
            return;
        }
        log::debug!("{LOAD_TEXTURE}: {} encoded bytes for device {device}", encoded.len());
        self.tasks.spawn(async move {
            Settled::Texture {
                device,
                result: decode_image(&encoded),
            }
        });
    }

    /// Upload a decoded image and register the texture and its view.
    pub(crate) fn upload_texture(
        &mut self,
        device: Handle,
        image: &DecodedImage,
    ) -> Result<(Handle, Handle), BridgeError> {
        let slot = lookup(&self.objects.devices, ResourceKind::Device, device)?;
        let texture = self
            .gpu
            .create_texture_with_data(&slot.device, &slot.queue, image)?;
        let view = self
            .gpu
            .create_texture_view(&texture, &TextureViewDescriptor::default())?;
        log::info!("texture loaded: {}x{}", image.width, image.height);
        Ok((self.objects.textures.insert(texture), self.objects.views.insert(view)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use gpubridge_abi::WireCode;
    use image::{ImageFormat, RgbaImage};

    use super::*;
    use crate::async_bridge::GuestValue;
    use crate::audio::NullAudio;
    use crate::mock::{init_logging, ready_device, MockGpu, RecordingGuest};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let pixels = (0..width * height * 4).map(|i| i as u8).collect();
        let image = RgbaImage::from_raw(width, height, pixels).unwrap();
        let mut encoded = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .unwrap();
        encoded
    }

    fn with_device() -> (Host<MockGpu, NullAudio>, RecordingGuest, Handle) {
        init_logging();
        let mut host = Host::new(MockGpu::default(), NullAudio);
        let mut guest = RecordingGuest::default();
        let device = ready_device(&mut host, &mut guest);
        host.gpu().clear_calls();
        (host, guest, device)
    }

    #[test]
    fn test_decode_image_expands_to_rgba() {
        let image = decode_image(&png(3, 2)).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.rgba.len(), 3 * 2 * 4);
        assert_eq!(&image.rgba[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);

        let gray = b"P5\n2 1\n255\n\x10\x20";
        let image = decode_image(gray).unwrap();
        assert_eq!(image.rgba, vec![0x10, 0x10, 0x10, 0xff, 0x20, 0x20, 0x20, 0xff]);
    }

    #[test]
    fn test_texture_arrives_on_pump() {
        let (mut host, mut guest, device) = with_device();
        host.load_texture(device, png(4, 4));
        assert!(guest.calls_to("on_texture_loaded").is_empty());
        assert!(host.gpu().calls().is_empty());

        assert_eq!(host.pump_with(&mut guest), 1);
        assert_eq!(
            guest.calls_to("on_texture_loaded"),
            vec![vec![GuestValue::I32(1), GuestValue::I32(1), GuestValue::I32(0)]]
        );
        assert_eq!(
            host.gpu().calls(),
            vec!["create_texture_with_data 4x4", "create_texture_view"]
        );
        assert!(host.objects().textures.get(1).is_some());
        assert!(host.objects().views.get(1).is_some());
        assert_eq!(host.has_last_error(), 0);
        assert_eq!(host.pump_with(&mut guest), 0);
    }

    #[test]
    fn test_undecodable_image_fails_once() {
        let (mut host, mut guest, device) = with_device();
        host.load_texture(device, b"not an image".to_vec());
        assert_eq!(host.has_last_error(), 0);

        host.pump_with(&mut guest);
        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("on_texture_loaded"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(0), GuestValue::I32(1)]]
        );
        let message = host.last_error().unwrap_or_default();
        assert!(message.starts_with("load_texture: failed to decode image"), "{message}");
        assert!(host.objects().textures.get(1).is_none());
    }

    #[test]
    fn test_invalid_device_still_gets_a_callback() {
        let (mut host, mut guest, _) = with_device();
        host.load_texture(9, png(1, 1));
        assert_eq!(
            host.last_error().as_deref(),
            Some("load_texture: invalid device handle 9")
        );
        assert!(guest.calls_to("on_texture_loaded").is_empty());

        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("on_texture_loaded"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(0), GuestValue::I32(1)]]
        );
        assert!(host.gpu().calls().is_empty());
    }

    #[test]
    fn test_device_released_before_upload() {
        let (mut host, mut guest, device) = with_device();
        host.load_texture(device, png(2, 2));
        host.release_handle(ResourceKind::Device.code(), device);

        host.pump_with(&mut guest);
        assert_eq!(
            guest.calls_to("on_texture_loaded"),
            vec![vec![GuestValue::I32(0), GuestValue::I32(0), GuestValue::I32(1)]]
        );
        assert_eq!(
            host.last_error(),
            Some(format!("load_texture: invalid device handle {device}"))
        );
    }
}
