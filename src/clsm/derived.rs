//! Images derived from the voxel grid and the stream it was filled from

use crate::clsm::grid::Shape;
use crate::clsm::image::ClsmImage;
use crate::error::{Result, TttrError};
use crate::event_stream::EventStream;
use crate::profile_scope;
use crate::utils::misc::coarsened_len;
use ndarray::{Array2, Array3, Array4, ArrayView3, ArrayViewMut1, Axis, Zip};

/// Value written for voxels with too few photons for a mean micro time.
pub const INSUFFICIENT_PHOTONS: f64 = -1.0;

/// Evaluates `value` for every element of `out`, in parallel with the
/// `parallel` feature. `value` must not capture the image, whose cache is
/// not `Sync`.
fn fill_indexed<F>(out: &mut Array3<f64>, value: F)
where
    F: Fn((usize, usize, usize)) -> f64 + Sync + Send,
{
    let zip = Zip::indexed(out);
    #[cfg(feature = "parallel")]
    zip.par_for_each(|index, v| *v = value(index));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|index, v| *v = value(index));
}

/// Like [`fill_indexed`] for the last-axis lanes of a 4-D array.
fn fill_lanes<F>(out: &mut Array4<u32>, fill: F)
where
    F: Fn((usize, usize, usize), ArrayViewMut1<'_, u32>) + Sync + Send,
{
    let zip = Zip::indexed(out.lanes_mut(Axis(3)));
    #[cfg(feature = "parallel")]
    zip.par_for_each(|index, lane| fill(index, lane));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|index, lane| fill(index, lane));
}

fn check_coarsening(coarsening: usize) -> Result<()> {
    if coarsening == 0 {
        return Err(TttrError::config("micro time coarsening must be positive"));
    }
    Ok(())
}

/// Flat voxel indices contributing to output `(frame, line, pixel)`.
fn contributing_voxels(
    shape: Shape,
    (frame, line, pixel): (usize, usize, usize),
    stack_frames: bool,
) -> impl Iterator<Item = usize> {
    let frames = if stack_frames {
        0..shape.n_frames
    } else {
        frame..frame + 1
    };
    frames.map(move |f| (f * shape.n_lines + line) * shape.n_pixel + pixel)
}

impl ClsmImage {
    fn output_frames(&self, stack_frames: bool) -> usize {
        if stack_frames {
            1
        } else {
            self.shape().n_frames
        }
    }

    /// Mean micro time (in micro-time channels) per voxel.
    ///
    /// # Arguments
    /// * `stream` - The stream the image was filled from
    /// * `minimum_number_of_photons` - Voxels with fewer photons get
    ///   [`INSUFFICIENT_PHOTONS`]; empty voxels always do
    /// * `stack_frames` - Pool all frames into a single output frame
    ///
    /// # Returns
    /// An array shaped `[frame, line, pixel]`.
    pub fn mean_micro_time_image(
        &self,
        stream: &EventStream,
        minimum_number_of_photons: usize,
        stack_frames: bool,
    ) -> Result<Array3<f64>> {
        self.check_stream(stream)?;
        profile_scope!("clsm mean micro time image");
        let shape = self.shape();
        let micro_times = stream.micro_times();
        let arena = self.arena();
        let threshold = minimum_number_of_photons.max(1);

        let mut out = Array3::zeros((
            self.output_frames(stack_frames),
            shape.n_lines,
            shape.n_pixel,
        ));
        fill_indexed(&mut out, |index| {
            let mut n = 0usize;
            let mut mean = 0.0;
            for voxel in contributing_voxels(shape, index, stack_frames) {
                for &photon in arena.voxel(voxel) {
                    n += 1;
                    mean += (micro_times[photon] as f64 - mean) / n as f64;
                }
            }
            if n < threshold {
                INSUFFICIENT_PHOTONS
            } else {
                mean
            }
        });
        Ok(out)
    }

    /// Micro-time histogram per voxel.
    ///
    /// # Arguments
    /// * `stream` - The stream the image was filled from
    /// * `micro_time_coarsening` - Adjacent micro-time channels merged per bin
    /// * `stack_frames` - Pool all frames into a single output frame
    ///
    /// # Returns
    /// An array shaped `[frame, line, pixel, bin]`.
    pub fn decay_image(
        &self,
        stream: &EventStream,
        micro_time_coarsening: usize,
        stack_frames: bool,
    ) -> Result<Array4<u32>> {
        self.check_stream(stream)?;
        check_coarsening(micro_time_coarsening)?;
        profile_scope!("clsm decay image");
        let shape = self.shape();
        let n_bins = coarsened_len(stream.micro_time_channel_count(), micro_time_coarsening);
        let micro_times = stream.micro_times();
        let arena = self.arena();

        let mut out = Array4::zeros((
            self.output_frames(stack_frames),
            shape.n_lines,
            shape.n_pixel,
            n_bins,
        ));
        fill_lanes(&mut out, |index, mut lane| {
            for voxel in contributing_voxels(shape, index, stack_frames) {
                for &photon in arena.voxel(voxel) {
                    lane[micro_times[photon] as usize / micro_time_coarsening] += 1;
                }
            }
        });
        Ok(out)
    }

    /// Micro-time histogram of all voxels selected by `mask`.
    ///
    /// # Arguments
    /// * `mask` - Selection shaped like the image, `[frame, line, pixel]`
    ///
    /// # Returns
    /// One histogram per frame (a single row with `stack_frames`), shaped `[frame, bin]`.
    pub fn decay_of_mask(
        &self,
        stream: &EventStream,
        mask: ArrayView3<'_, bool>,
        micro_time_coarsening: usize,
        stack_frames: bool,
    ) -> Result<Array2<u32>> {
        self.check_stream(stream)?;
        check_coarsening(micro_time_coarsening)?;
        let shape = self.shape();
        if mask.dim() != shape.as_tuple() {
            return Err(TttrError::config(format!(
                "mask shape {:?} does not match image shape {:?}",
                mask.dim(),
                shape.as_tuple()
            )));
        }
        let n_bins = coarsened_len(stream.micro_time_channel_count(), micro_time_coarsening);
        let micro_times = stream.micro_times();
        let mut out = Array2::zeros((self.output_frames(stack_frames), n_bins));
        for ((frame, line, pixel), &selected) in mask.indexed_iter() {
            if !selected {
                continue;
            }
            let row = if stack_frames { 0 } else { frame };
            let voxel = (frame * shape.n_lines + line) * shape.n_pixel + pixel;
            for &photon in self.arena().voxel(voxel) {
                out[[row, micro_times[photon] as usize / micro_time_coarsening]] += 1;
            }
        }
        Ok(out)
    }
}
