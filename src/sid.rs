//! Stream identity: network, station, location and channel codes.
//!
//! Two records belong to the same physical channel exactly when their
//! [`StreamId`]s are equal. The source name form `NET_STA_LOC_CHA` is used in
//! reports; the FDSN Source Identifier form splits the channel code into
//! band, source and subsource.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Network/station/location/channel identity of a stream.
///
/// # Examples
///
/// ```
/// use miniseed_traces::StreamId;
///
/// let id = StreamId::new("BW", "FUR", "", "EHZ");
/// assert_eq!(id.source_name(), "BW_FUR__EHZ");
/// assert_eq!(id.fdsn_source_id(), "FDSN:BW_FUR__E_H_Z");
/// assert_eq!(StreamId::parse("BW.FUR..EHZ"), Some(id));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl StreamId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
        }
    }

    /// Parse `NET_STA_LOC_CHA` or `NET.STA.LOC.CHA`.
    pub fn parse(s: &str) -> Option<Self> {
        let sep = if s.contains('_') { '_' } else { '.' };
        let parts: Vec<&str> = s.split(sep).collect();
        match parts.as_slice() {
            [net, sta, loc, cha] => Some(Self::new(net, sta, loc, cha)),
            _ => None,
        }
    }

    /// `NET_STA_LOC_CHA`.
    pub fn source_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// `FDSN:NET_STA_LOC_BAND_SOURCE_SUBSOURCE`.
    pub fn fdsn_source_id(&self) -> String {
        let (band, source, subsource) = split_channel(&self.channel);
        format!(
            "FDSN:{}_{}_{}_{band}_{source}_{subsource}",
            self.network, self.station, self.location
        )
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Split a channel code into (band, source, subsource), one char each.
fn split_channel(channel: &str) -> (&str, &str, &str) {
    let mut bounds = channel.char_indices().map(|(i, _)| i).chain([channel.len()]);
    let a = bounds.next().unwrap_or(0);
    let b = bounds.next().unwrap_or(a);
    let c = bounds.next().unwrap_or(b);
    let d = bounds.next().unwrap_or(c);
    (&channel[a..b], &channel[b..c], &channel[c..d])
}
