use image::RgbImage;
use rayon::prelude::*;
use tracing::instrument;

use crate::imageops::convert_color::YCbCrPlanes;

/// Filter settings for [`denoise_colored`].
///
/// `h_luminance` and `h_color` are filter strengths for the luma and chroma planes;
/// larger values remove more noise and more detail. Window sizes are in pixels and
/// should be odd.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenoiseParams {
    pub h_luminance: f32,
    pub h_color: f32,
    pub template_window: usize,
    pub search_window: usize,
}

impl DenoiseParams {
    /// Gentle pass over the source photograph.
    pub const BEFORE_INFERENCE: Self = Self {
        h_luminance: 5.0,
        h_color: 5.0,
        template_window: 7,
        search_window: 21,
    };

    /// Stronger, more local pass over the network output.
    pub const AFTER_INFERENCE: Self = Self {
        h_luminance: 10.0,
        h_color: 10.0,
        template_window: 5,
        search_window: 5,
    };
}

/// Non-local-means denoising of a colour image.
///
/// Luma is filtered with `h_luminance` and both chroma planes jointly with
/// `h_color`. Patch distances use per-offset summed-area tables, so the cost is
/// `search_window²` passes over the image regardless of the template size.
#[instrument(level = "info", skip_all, fields(width = image.width(), height = image.height()))]
pub fn denoise_colored(image: &RgbImage, params: DenoiseParams) -> RgbImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let mut planes = YCbCrPlanes::from_rgb(image);
    let (width, height) = (planes.width, planes.height);
    let window = Window::new(params.template_window, params.search_window);

    let [luma] = nl_means([&planes.luma], width, height, params.h_luminance, window);
    let [cb, cr] = nl_means(
        [&planes.cb, &planes.cr],
        width,
        height,
        params.h_color,
        window,
    );
    planes.luma = luma;
    planes.cb = cb;
    planes.cr = cr;
    planes.to_rgb()
}

#[derive(Debug, Clone, Copy)]
struct Window {
    template_radius: usize,
    search_radius: usize,
}

impl Window {
    const fn new(template: usize, search: usize) -> Self {
        Self {
            template_radius: template / 2,
            search_radius: search / 2,
        }
    }

    const fn template_side(&self) -> usize {
        self.template_radius * 2 + 1
    }

    const fn border(&self) -> usize {
        self.template_radius + self.search_radius
    }
}

fn nl_means<const N: usize>(
    planes: [&Vec<f32>; N],
    width: usize,
    height: usize,
    strength: f32,
    window: Window,
) -> [Vec<f32>; N] {
    let t = window.template_radius;
    let s = window.search_radius as isize;
    let border = window.border();
    let padded_width = width + 2 * border;
    let padded: Vec<Vec<f32>> = planes
        .iter()
        .map(|plane| pad_reflect(plane, width, height, border))
        .collect();

    // Patch distances are needed for every pixel within `t` of the image.
    let diff_width = width + 2 * t;
    let diff_height = height + 2 * t;
    let side = window.template_side();
    let norm = 1.0 / (side * side * N) as f32;
    let inv_h2 = 1.0 / (strength * strength).max(f32::EPSILON);

    // Per pixel: total weight followed by one weighted sum per plane.
    let stride = N + 1;
    let mut acc = vec![0f32; width * height * stride];
    let mut diff = vec![0f32; diff_width * diff_height];
    let mut integral = vec![0f64; (diff_width + 1) * (diff_height + 1)];

    for dy in -s..=s {
        for dx in -s..=s {
            diff.par_chunks_mut(diff_width)
                .enumerate()
                .for_each(|(wy, row)| {
                    let py = wy + window.search_radius;
                    let qy = (py as isize + dy) as usize;
                    for (wx, d) in row.iter_mut().enumerate() {
                        let px = wx + window.search_radius;
                        let qx = (px as isize + dx) as usize;
                        *d = padded
                            .iter()
                            .map(|p| {
                                let e = p[py * padded_width + px] - p[qy * padded_width + qx];
                                e * e
                            })
                            .sum();
                    }
                });

            summed_area(&diff, diff_width, diff_height, &mut integral);

            acc.par_chunks_mut(width * stride)
                .enumerate()
                .for_each(|(y, row)| {
                    let qy = ((y + border) as isize + dy) as usize;
                    for x in 0..width {
                        let ssd = box_sum(&integral, diff_width, x, y, side) as f32;
                        let weight = (-(ssd * norm) * inv_h2).exp();
                        let qx = ((x + border) as isize + dx) as usize;
                        let cell = &mut row[x * stride..(x + 1) * stride];
                        cell[0] += weight;
                        for (c, p) in padded.iter().enumerate() {
                            cell[c + 1] += weight * p[qy * padded_width + qx];
                        }
                    }
                });
        }
    }

    std::array::from_fn(|c| {
        acc.chunks_exact(stride)
            .map(|cell| cell[c + 1] / cell[0])
            .collect()
    })
}

/// Mirror index without repeating the edge pixel (`dcb|abcd|cba`).
fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = index.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

fn pad_reflect(plane: &[f32], width: usize, height: usize, border: usize) -> Vec<f32> {
    let padded_width = width + 2 * border;
    let padded_height = height + 2 * border;
    let mut out = Vec::with_capacity(padded_width * padded_height);
    for py in 0..padded_height {
        let y = reflect(py as isize - border as isize, height);
        for px in 0..padded_width {
            let x = reflect(px as isize - border as isize, width);
            out.push(plane[y * width + x]);
        }
    }
    out
}

fn summed_area(values: &[f32], width: usize, height: usize, out: &mut [f64]) {
    let stride = width + 1;
    out[..stride].fill(0.0);
    for y in 0..height {
        let mut row_sum = 0f64;
        out[(y + 1) * stride] = 0.0;
        for x in 0..width {
            row_sum += f64::from(values[y * width + x]);
            out[(y + 1) * stride + x + 1] = out[y * stride + x + 1] + row_sum;
        }
    }
}

fn box_sum(integral: &[f64], width: usize, x0: usize, y0: usize, side: usize) -> f64 {
    let stride = width + 1;
    let (x1, y1) = (x0 + side, y0 + side);
    integral[y1 * stride + x1] - integral[y0 * stride + x1] - integral[y1 * stride + x0]
        + integral[y0 * stride + x0]
}
