use serde::{Deserialize, Serialize};

use super::face_info::FaceInfo;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FoundFace {
    pub bbox: [f32; 4],
    pub score: f32,
    pub landmarks: [[f32; 2]; 5],
}

impl From<&FaceInfo> for FoundFace {
    fn from(info: &FaceInfo) -> FoundFace {
        let b = &info.bbox;
        let mut landmarks = [[0.0; 2]; 5];
        for (point, xy) in landmarks.iter_mut().zip(info.landmark.chunks_exact(2)) {
            *point = [xy[0], xy[1]];
        }
        FoundFace {
            bbox: [b.xmin, b.ymin, b.xmax, b.ymax],
            score: b.score,
            landmarks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtcnn::face_info::FaceBox;

    #[test]
    fn landmarks_are_paired_in_order() {
        let mut info = FaceInfo::new(FaceBox::new(1.0, 2.0, 3.0, 4.0, 0.8));
        info.landmark = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let face = FoundFace::from(&info);
        assert_eq!(face.bbox, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(face.score, 0.8);
        assert_eq!(face.landmarks[0], [0.0, 1.0]);
        assert_eq!(face.landmarks[4], [8.0, 9.0]);
    }

    #[test]
    fn serializes_as_plain_arrays() {
        let face = FoundFace::from(&FaceInfo::new(FaceBox::new(0.0, 0.0, 11.0, 11.0, 0.5)));
        let json = serde_json::to_value(&face).unwrap();
        assert_eq!(json["bbox"][2], 11.0);
        assert_eq!(json["landmarks"].as_array().unwrap().len(), 5);
    }
}
