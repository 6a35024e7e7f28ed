//! Channel mixing: stereo downmix and exclusive-channel routing

use serde::Deserialize;

/// Which stereo channel a mono signal is routed to
///
/// Routing is exclusive: the other channel always receives zeros, so each
/// persona owns one physical speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StereoChannel {
    Left,
    Right,
}

/// Downmix interleaved multi-channel PCM to mono
///
/// Channels are summed in i32 headroom and saturated to the 16-bit range,
/// never wrapped. Mono input is returned unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn downmix_to_mono(interleaved: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(usize::from(channels))
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
        })
        .collect()
}

/// Place a mono signal into exactly one channel of an interleaved stereo
/// frame, zeroing the other
#[must_use]
pub fn route_stereo(mono: &[i16], channel: StereoChannel) -> Vec<i16> {
    let mut stereo = Vec::with_capacity(mono.len() * 2);
    for &sample in mono {
        match channel {
            StereoChannel::Left => {
                stereo.push(sample);
                stereo.push(0);
            }
            StereoChannel::Right => {
                stereo.push(0);
                stereo.push(sample);
            }
        }
    }
    stereo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passthrough() {
        let samples = [1, -2, 3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn stereo_sum_with_headroom() {
        // L+R summed per frame
        let interleaved = [100, 200, -50, -50];
        assert_eq!(downmix_to_mono(&interleaved, 2), vec![300, -100]);
    }

    #[test]
    fn stereo_sum_saturates_instead_of_wrapping() {
        let interleaved = [30_000, 30_000, -30_000, -30_000];
        assert_eq!(downmix_to_mono(&interleaved, 2), vec![32_767, -32_768]);
    }

    #[test]
    fn left_routing_zeroes_right() {
        assert_eq!(route_stereo(&[7, -7], StereoChannel::Left), vec![7, 0, -7, 0]);
    }

    #[test]
    fn right_routing_zeroes_left() {
        assert_eq!(route_stereo(&[7, -7], StereoChannel::Right), vec![0, 7, 0, -7]);
    }
}
