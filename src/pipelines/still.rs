// SPDX-License-Identifier: GPL-3.0-only

//! Still image path
//!
//! The image is uploaded once; every call to [`StillPipeline::process`]
//! pixelates it with the given block size, waits for the GPU and reads the
//! result back. No color conversion is involved.

use super::dispatcher::ComputeDispatcher;
use super::parameter::{BlockSize, BlockSizeParameter};
use crate::constants::kernels;
use crate::errors::{PipelineError, PipelineResult};
use crate::shaders::{ImportedImage, KernelLibrary, PixelationStage, ReadbackBuffer, decode_image};
use image::RgbaImage;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

pub struct StillPipeline {
    dispatcher: Arc<ComputeDispatcher>,
    stage: PixelationStage,
    image: Option<ImportedImage>,
    /// The stage has one uniform buffer; writing it, encoding and submitting
    /// must not interleave between callers
    submit_lock: Mutex<()>,
}

impl StillPipeline {
    pub async fn new(
        dispatcher: Arc<ComputeDispatcher>,
        library: &KernelLibrary,
    ) -> PipelineResult<Self> {
        let stage = PixelationStage::new(Arc::clone(dispatcher.context()), library).await?;
        Ok(Self {
            dispatcher,
            stage,
            image: None,
            submit_lock: Mutex::new(()),
        })
    }

    /// Decode and upload an image file, replacing any previous image
    pub fn load_image(&mut self, path: &Path) -> PipelineResult<(u32, u32)> {
        let image = decode_image(path)?;
        self.set_image(&image);
        Ok(image.dimensions())
    }

    /// Upload an in-memory image, replacing any previous image
    pub fn set_image(&mut self, image: &RgbaImage) {
        self.image = Some(ImportedImage::upload(self.dispatcher.context(), image));
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(ImportedImage::dimensions)
    }

    /// Pixelate the current image and return the result
    ///
    /// Blocks until the GPU has finished and the output is copied back. Safe
    /// to call from several threads at once; submissions are serialized.
    pub async fn process(&self, block: BlockSize) -> PipelineResult<RgbaImage> {
        let image = self
            .image
            .as_ref()
            .ok_or(PipelineError::TexturesNotReady(kernels::PIXELATE))?;
        let (width, height) = image.dimensions();
        let start = Instant::now();

        let (readback, submission) = {
            let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut encoder = self.dispatcher.create_encoder("still_pixelate_encoder");
            self.stage
                .encode(&self.dispatcher, &mut encoder, &image.input, &image.output, block)?;
            // The copy rides in the same submission, so later callers cannot
            // overwrite the output before it is read
            let readback = ReadbackBuffer::encode(
                self.dispatcher.context().device(),
                &mut encoder,
                &image.output,
            );
            (readback, self.dispatcher.submit_and_wait(encoder)?)
        };

        let data = readback.read(self.dispatcher.context()).await?;
        let output = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| PipelineError::Readback("short readback buffer".to_string()))?;

        debug!(
            sequence = submission.sequence,
            width,
            height,
            block_size = block.get(),
            elapsed_ms = format!("{:.2}", start.elapsed().as_micros() as f64 / 1000.0),
            "Still image pixelated"
        );
        Ok(output)
    }

    /// Re-run with whatever block size the parameter currently holds
    pub async fn reprocess(&self, parameter: &BlockSizeParameter) -> PipelineResult<RgbaImage> {
        let block = parameter.get();
        info!(block_size = block.get(), "Reprocessing still image");
        self.process(block).await
    }
}
