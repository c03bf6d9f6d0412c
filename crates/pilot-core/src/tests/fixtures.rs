//! Test fixtures and helpers

use crate::log::{LineFramer, LogRecord, parse_line};

pub const SETUP_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PlusConfiguration version="2.3">
  <DataCollection StartupDelaySec="1.0">
    <DeviceSet Name="PlusServer: Media Foundation video capture device" Description="Broadcasting acquired video through OpenIGTLink" />
    <Device Id="VideoDevice" Type="MmfVideo" />
  </DataCollection>
  <PlusOpenIGTLinkServer MaxNumberOfIgtlMessagesToSend="1" ListeningPort="18944" SendValidTransformsOnly="true" OutputChannelId="OutputA">
    <DefaultClientInfo>
      <MessageTypes><Message Type="IMAGE" /></MessageTypes>
    </DefaultClientInfo>
  </PlusOpenIGTLinkServer>
</PlusConfiguration>
"#;

/// A typical server session, as the server prints it.
pub const SERVER_SESSION: &str = "\
|INFO|000.101000|Software version: Plus-2.8.0|in E:\\Plus\\PlusServer.cxx(140)\r\n\
|DEBUG|000.120000|Reading configuration|in E:\\Plus\\vtkPlusConfig.cxx(88)\r\n\
|INFO|001.803000|Plus OpenIGTLink server listening on IPs: 127.0.0.1, 10.0.0.4 -- port 18944|in E:\\Plus\\vtkPlusOpenIGTLinkServer.cxx(282)\r\n\
|INFO|001.910000|Server status: Server(s) are running.|in E:\\Plus\\PlusServer.cxx(217)\r\n\
Press Q or Ctrl-C to quit\r\n";

/// Split `input` into chunks of `size` bytes and run them through a framer
/// and the record parser.
pub fn frame_and_parse(input: &[u8], size: usize) -> Vec<LogRecord> {
    let mut framer = LineFramer::new();
    let mut lines = Vec::new();
    for chunk in input.chunks(size) {
        lines.extend(framer.push(chunk));
    }
    lines.extend(framer.flush());
    lines
        .iter()
        .filter_map(|line| parse_line(line).ok())
        .collect()
}
