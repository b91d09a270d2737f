//! XML report writer.
use super::{ContextError, PoolingMethod, collector::FeatureCollector};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesStart, Event},
};
use std::io::Write;

fn xml_err(err: impl std::fmt::Display) -> ContextError {
    ContextError::Output(err.to_string())
}

pub(super) struct XmlReport<'a> {
    pub collector: &'a FeatureCollector,
    pub version: &'a str,
    pub width: usize,
    pub height: usize,
    pub n_subsample: u32,
}

impl XmlReport<'_> {
    fn is_skipped(&self, index: usize) -> bool {
        self.n_subsample > 1 && index % self.n_subsample as usize != 0
    }

    pub fn write(&self, out: impl Write) -> Result<(), ContextError> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let mut root = BytesStart::new("VMAF");
        root.push_attribute(("version", self.version));
        writer
            .write_event(Event::Start(root.borrow()))
            .map_err(xml_err)?;

        let mut params = BytesStart::new("params");
        params.push_attribute(("qualityWidth", self.width.to_string().as_str()));
        params.push_attribute(("qualityHeight", self.height.to_string().as_str()));
        writer.write_event(Event::Empty(params)).map_err(xml_err)?;

        let frames = BytesStart::new("frames");
        writer
            .write_event(Event::Start(frames.borrow()))
            .map_err(xml_err)?;
        for index in (0..self.collector.frame_count()).filter(|i| !self.is_skipped(*i)) {
            let mut frame = BytesStart::new("frame");
            frame.push_attribute(("frameNum", index.to_string().as_str()));
            for feature in self.collector.features() {
                if let Some(score) = feature.get(index) {
                    frame.push_attribute((feature.name.as_str(), format!("{score:.6}").as_str()));
                }
            }
            writer.write_event(Event::Empty(frame)).map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(frames.to_end()))
            .map_err(xml_err)?;

        let pooled = BytesStart::new("pooled_metrics");
        writer
            .write_event(Event::Start(pooled.borrow()))
            .map_err(xml_err)?;
        for feature in self.collector.features() {
            let scores: Vec<f64> = (0..feature.len())
                .filter(|i| !self.is_skipped(*i))
                .filter_map(|i| feature.get(i))
                .collect();
            if scores.is_empty() {
                continue;
            }
            let mut metric = BytesStart::new("metric");
            metric.push_attribute(("name", feature.name.as_str()));
            for (attr, method) in [
                ("min", PoolingMethod::Min),
                ("max", PoolingMethod::Max),
                ("mean", PoolingMethod::Mean),
                ("harmonic_mean", PoolingMethod::HarmonicMean),
            ] {
                let value = method.pool(&scores);
                metric.push_attribute((attr, format!("{value:.6}").as_str()));
            }
            writer.write_event(Event::Empty(metric)).map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(pooled.to_end()))
            .map_err(xml_err)?;

        writer
            .write_event(Event::End(root.to_end()))
            .map_err(xml_err)?;
        writer.into_inner().flush()?;
        Ok(())
    }
}
