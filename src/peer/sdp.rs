//! Minimal SDP text edits: fmtp parameter injection and codec reordering.
//!
//! Both edits return the input byte-for-byte when they have nothing to do.

use crate::config::SdpRewriteConfig;
use tracing::debug;

fn line_separator(sdp: &str) -> &'static str {
    if sdp.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Index of the first line in `lines[start..end]` starting with `prefix` and,
/// if given, containing `substr` (case-insensitive).
fn find_line_in_range(
    lines: &[&str],
    start: usize,
    end: usize,
    prefix: &str,
    substr: Option<&str>,
) -> Option<usize> {
    let needle = substr.map(str::to_lowercase);
    (start..end.min(lines.len())).find(|&i| {
        let line = lines[i];
        line.starts_with(prefix)
            && needle
                .as_deref()
                .map_or(true, |n| line.to_lowercase().contains(n))
    })
}

/// Payload type of an `a=rtpmap:<pt> <name>/<clockrate>` line
fn codec_payload_type(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("a=rtpmap:")?;
    let (pt, encoding) = rest.split_once(' ')?;
    if pt.is_empty() || !pt.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (name, rate) = encoding.split_once('/')?;
    let name_ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    let rate_ok = rate.chars().next().is_some_and(|c| c.is_ascii_digit());
    (name_ok && rate_ok).then_some(pt)
}

fn is_fmtp_for(line: &str, payload: &str) -> bool {
    line.strip_prefix("a=fmtp:")
        .and_then(|rest| rest.strip_prefix(payload))
        .is_some_and(|tail| tail.is_empty() || tail.starts_with(' '))
}

fn fmtp_has_param(line: &str, param: &str) -> bool {
    line.split_once(' ')
        .map(|(_, params)| params.split(';').any(|p| p.trim() == param))
        .unwrap_or(false)
}

/// Appends `; <param>` to the fmtp line of the codec matching `codec`
/// (e.g. `opus/48000`). A param already present is not added twice.
pub fn inject_codec_param(sdp: &str, codec: &str, param: &str) -> String {
    let sep = line_separator(sdp);
    let mut lines: Vec<&str> = sdp.split(sep).collect();

    let Some(rtpmap) = find_line_in_range(&lines, 0, lines.len(), "a=rtpmap", Some(codec)) else {
        return sdp.to_string();
    };
    let Some(payload) = codec_payload_type(lines[rtpmap]) else {
        return sdp.to_string();
    };
    let Some(fmtp) = lines.iter().position(|l| is_fmtp_for(l, payload)) else {
        return sdp.to_string();
    };
    if fmtp_has_param(lines[fmtp], param) {
        return sdp.to_string();
    }

    debug!("Adding {} to fmtp of payload {} ({})", param, payload, codec);
    let edited = format!("{}; {}", lines[fmtp], param);
    lines[fmtp] = &edited;
    lines.join(sep)
}

/// Moves the payload type of `codec` to the front of the audio m= line,
/// keeping the relative order of the remaining payload types.
pub fn prefer_codec(sdp: &str, codec: &str) -> String {
    let sep = line_separator(sdp);
    let mut lines: Vec<&str> = sdp.split(sep).collect();

    let Some(m_line) = lines.iter().position(|l| l.starts_with("m=audio ")) else {
        debug!("No m=audio line, cannot prefer {}", codec);
        return sdp.to_string();
    };
    let section_end = lines
        .iter()
        .skip(m_line + 1)
        .position(|l| l.starts_with("m="))
        .map_or(lines.len(), |offset| m_line + 1 + offset);

    let Some(payload) = find_line_in_range(&lines, m_line + 1, section_end, "a=rtpmap", Some(codec))
        .and_then(|i| codec_payload_type(lines[i]))
    else {
        debug!("No {} rtpmap in audio section, leaving SDP as is", codec);
        return sdp.to_string();
    };

    // m=<media> <port> <proto> <fmt> ...
    let parts: Vec<&str> = lines[m_line].split(' ').collect();
    if parts.len() < 4 || !parts[3..].contains(&payload) || parts[3] == payload {
        return sdp.to_string();
    }

    let reordered: Vec<&str> = parts[..3]
        .iter()
        .copied()
        .chain(std::iter::once(payload))
        .chain(parts[3..].iter().copied().filter(|p| *p != payload))
        .collect();
    let edited = reordered.join(" ");
    lines[m_line] = &edited;
    lines.join(sep)
}

/// Applies the configured inbound rewrite to a remote offer/answer
pub fn rewrite_remote(sdp: &str, policy: &SdpRewriteConfig) -> String {
    let mut out = sdp.to_string();
    for (codec, param) in &policy.codec_params {
        out = inject_codec_param(&out, codec, param);
    }
    if let Some(codec) = &policy.preferred_audio_codec {
        out = prefer_codec(&out, codec);
    }
    out
}
