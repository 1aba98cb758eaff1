//! Shared image preprocessing utilities
//!
//! Turns detections on a frame into the normalized NCHW crop batch every
//! re-identification backend consumes, and holds the tensor helpers the
//! backends share.

use crate::error::{ReidError, Result};
use image::{imageops, RgbImage};
use ndarray::{Array2, Array4, ArrayView3, Axis};

/// Crop preprocessing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel mean in RGB order, applied after scaling to [0, 1]
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in RGB order
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // Person ReID models are trained on 256x128 crops with ImageNet statistics
        Self {
            target_size: [256, 128],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Shared crop preprocessing for re-identification models
#[derive(Debug, Clone, Default)]
pub struct ReidPreprocessor {
    config: PreprocessingConfig,
}

impl ReidPreprocessor {
    #[must_use]
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Crop `xyxy` boxes out of a frame and stack them into a normalized NCHW batch
    ///
    /// Boxes are clipped to the frame. An empty box list yields an empty batch.
    ///
    /// # Errors
    /// - A box has no area after clipping
    pub fn crops_to_tensor(&self, image: &RgbImage, boxes: &[[f32; 4]]) -> Result<Array4<f32>> {
        let [height, width] = self.config.target_size;
        let mut tensor = Array4::<f32>::zeros((boxes.len(), 3, height as usize, width as usize));
        let (frame_w, frame_h) = image.dimensions();

        for (index, bbox) in boxes.iter().enumerate() {
            let (x1, y1, x2, y2) = Self::clip_box(*bbox, frame_w, frame_h);
            if x2 <= x1 || y2 <= y1 {
                return Err(ReidError::invalid_input(format!(
                    "Box {index} {bbox:?} has no area inside the {frame_w}x{frame_h} frame"
                )));
            }
            let crop = imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
            self.write_normalized(&crop, &mut tensor, index);
        }

        Ok(tensor)
    }

    /// Resize whole images into a normalized NCHW batch
    ///
    /// # Errors
    /// - An image has zero width or height
    pub fn images_to_tensor(&self, images: &[RgbImage]) -> Result<Array4<f32>> {
        let [height, width] = self.config.target_size;
        let mut tensor = Array4::<f32>::zeros((images.len(), 3, height as usize, width as usize));

        for (index, image) in images.iter().enumerate() {
            if image.width() == 0 || image.height() == 0 {
                return Err(ReidError::invalid_input(format!("Image {index} is empty")));
            }
            self.write_normalized(image, &mut tensor, index);
        }

        Ok(tensor)
    }

    /// Clip an `xyxy` box to pixel coordinates inside the frame
    fn clip_box(bbox: [f32; 4], frame_w: u32, frame_h: u32) -> (u32, u32, u32, u32) {
        let clamp = |value: f32, max: u32| value.max(0.0).min(max as f32).round() as u32;
        let [x1, y1, x2, y2] = bbox;
        (
            clamp(x1, frame_w),
            clamp(y1, frame_h),
            clamp(x2, frame_w),
            clamp(y2, frame_h),
        )
    }

    /// Resize one image and write it into slot `index` of the batch
    #[allow(clippy::indexing_slicing)]
    // Safe: the resized image matches the pre-allocated tensor dimensions
    fn write_normalized(&self, image: &RgbImage, tensor: &mut Array4<f32>, index: usize) {
        let [height, width] = self.config.target_size;
        let resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);
        let mean = self.config.normalization_mean;
        let std = self.config.normalization_std;

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / 255.0;
                tensor[[index, channel, y as usize, x as usize]] =
                    (value - mean[channel]) / std[channel];
            }
        }
    }
}

/// Check that a batch is a 3-channel NCHW image batch with non-empty planes
///
/// # Errors
/// - Channel count other than 3, or zero height/width
pub fn validate_nchw(batch: &Array4<f32>) -> Result<()> {
    let (_, channels, height, width) = batch.dim();
    if channels != 3 {
        return Err(ReidError::invalid_input(format!(
            "Expected 3-channel NCHW batch, got shape {:?}",
            batch.shape()
        )));
    }
    if height == 0 || width == 0 {
        return Err(ReidError::invalid_input(format!(
            "Batch has empty spatial dimensions: {:?}",
            batch.shape()
        )));
    }
    Ok(())
}

/// Convert an NCHW batch into a contiguous NHWC batch
#[must_use]
pub fn to_nhwc(batch: Array4<f32>) -> Array4<f32> {
    batch
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
}

/// Scale every row to unit L2 norm; all-zero rows are left untouched
#[must_use]
pub fn l2_normalize_rows(mut features: Array2<f32>) -> Array2<f32> {
    for mut row in features.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            row.mapv_inplace(|v| v / norm);
        }
    }
    features
}

/// View of one sample of an NCHW batch
#[must_use]
pub fn sample(batch: &Array4<f32>, index: usize) -> ArrayView3<'_, f32> {
    batch.index_axis(Axis(0), index)
}
