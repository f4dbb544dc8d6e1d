//! Fixed false-colour palette.

/// Number of palette entries.
pub const PALETTE_LEN: usize = 256;

/// Perceptually ordered "plasma" colour map, dark blue to yellow, as RGB.
///
/// Index 0 is used for long correlation times (little motion) and 255 for
/// short ones.
pub static PLASMA: [[u8; 3]; PALETTE_LEN] = [
    [15, 6, 139], [17, 6, 139], [19, 6, 140], [21, 6, 141],
    [24, 6, 142], [26, 6, 143], [28, 6, 143], [30, 6, 144],
    [32, 6, 145], [34, 6, 146], [36, 6, 147], [38, 6, 148],
    [40, 6, 149], [42, 5, 150], [44, 5, 150], [46, 5, 151],
    [47, 5, 152], [49, 4, 153], [51, 4, 154], [53, 4, 155],
    [55, 3, 156], [57, 3, 156], [59, 3, 157], [60, 3, 158],
    [62, 2, 159], [64, 2, 159], [66, 2, 160], [68, 1, 161],
    [69, 1, 162], [71, 1, 162], [73, 1, 163], [75, 1, 164],
    [76, 0, 164], [78, 0, 165], [80, 0, 165], [81, 0, 166],
    [83, 0, 166], [85, 0, 167], [86, 0, 167], [88, 0, 168],
    [90, 0, 168], [91, 0, 169], [93, 0, 169], [95, 0, 169],
    [96, 0, 170], [98, 0, 170], [99, 0, 170], [101, 0, 170],
    [103, 0, 171], [104, 0, 171], [106, 0, 171], [107, 0, 171],
    [109, 0, 171], [110, 1, 171], [112, 1, 171], [113, 1, 171],
    [115, 2, 171], [116, 2, 171], [118, 2, 171], [119, 3, 171],
    [121, 3, 171], [122, 4, 171], [124, 4, 171], [125, 5, 170],
    [127, 5, 170], [128, 6, 170], [130, 6, 170], [131, 7, 169],
    [133, 8, 169], [134, 8, 169], [135, 9, 168], [137, 10, 168],
    [138, 10, 167], [140, 11, 167], [141, 12, 167], [142, 13, 166],
    [144, 13, 166], [145, 14, 165], [147, 15, 165], [148, 16, 164],
    [149, 17, 163], [151, 18, 163], [152, 19, 162], [153, 20, 162],
    [155, 21, 161], [156, 22, 160], [157, 23, 160], [159, 24, 159],
    [160, 25, 158], [161, 26, 158], [162, 27, 157], [164, 28, 156],
    [165, 29, 155], [166, 30, 155], [167, 31, 154], [169, 32, 153],
    [170, 33, 152], [171, 34, 152], [172, 35, 151], [174, 37, 150],
    [175, 38, 149], [176, 39, 148], [177, 40, 147], [178, 41, 146],
    [179, 42, 146], [181, 44, 145], [182, 45, 144], [183, 46, 143],
    [184, 47, 142], [185, 48, 141], [186, 50, 140], [187, 51, 139],
    [189, 52, 138], [190, 53, 138], [191, 54, 137], [192, 56, 136],
    [193, 57, 135], [194, 58, 134], [195, 59, 133], [196, 61, 132],
    [197, 62, 131], [198, 63, 130], [199, 64, 129], [200, 66, 128],
    [201, 67, 127], [202, 68, 126], [203, 69, 125], [204, 70, 125],
    [205, 72, 124], [206, 73, 123], [207, 74, 122], [208, 75, 121],
    [209, 77, 120], [210, 78, 119], [211, 79, 118], [212, 80, 117],
    [213, 81, 116], [214, 83, 115], [215, 84, 114], [215, 85, 113],
    [216, 86, 112], [217, 87, 111], [218, 89, 110], [219, 90, 110],
    [220, 91, 109], [221, 92, 108], [221, 93, 107], [222, 95, 106],
    [223, 96, 105], [224, 97, 104], [225, 98, 103], [225, 99, 102],
    [226, 100, 101], [227, 102, 100], [228, 103, 100], [228, 104, 99],
    [229, 105, 98], [230, 106, 97], [231, 108, 96], [231, 109, 95],
    [232, 110, 94], [233, 111, 93], [233, 112, 92], [234, 113, 91],
    [235, 115, 91], [235, 116, 90], [236, 117, 89], [237, 118, 88],
    [237, 119, 87], [238, 121, 86], [239, 122, 85], [239, 123, 84],
    [240, 124, 84], [240, 125, 83], [241, 127, 82], [241, 128, 81],
    [242, 129, 80], [243, 130, 79], [243, 131, 78], [244, 133, 77],
    [244, 134, 77], [245, 135, 76], [245, 136, 75], [246, 138, 74],
    [246, 139, 73], [247, 140, 72], [247, 142, 71], [247, 143, 70],
    [248, 144, 70], [248, 145, 69], [249, 147, 68], [249, 148, 67],
    [250, 150, 66], [250, 151, 65], [250, 152, 64], [251, 154, 64],
    [251, 155, 63], [251, 156, 62], [252, 158, 61], [252, 159, 60],
    [252, 161, 59], [252, 162, 59], [253, 164, 58], [253, 165, 57],
    [253, 166, 56], [253, 168, 55], [254, 169, 54], [254, 171, 54],
    [254, 173, 53], [254, 174, 52], [254, 176, 51], [254, 177, 50],
    [255, 179, 50], [255, 180, 49], [255, 182, 48], [255, 183, 47],
    [255, 185, 46], [255, 187, 46], [255, 188, 45], [255, 190, 44],
    [255, 192, 44], [255, 193, 43], [255, 195, 42], [255, 197, 42],
    [255, 198, 41], [254, 200, 40], [254, 202, 40], [254, 203, 39],
    [254, 205, 39], [254, 207, 38], [254, 208, 37], [253, 210, 37],
    [253, 212, 37], [253, 213, 36], [252, 215, 36], [252, 217, 35],
    [252, 218, 35], [251, 220, 35], [251, 222, 34], [250, 223, 34],
    [250, 225, 34], [249, 227, 34], [249, 228, 34], [248, 230, 34],
    [247, 231, 34], [247, 233, 34], [246, 235, 34], [245, 236, 34],
    [244, 238, 34], [244, 239, 35], [243, 240, 35], [242, 242, 36],
    [241, 243, 36], [240, 244, 37], [239, 246, 37], [238, 247, 38],
];

/// Returns the palette colour at `index`.
#[inline]
pub fn color(index: u8) -> [u8; 3] {
    PLASMA[usize::from(index)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_runs_dark_to_bright() {
        let luma = |c: [u8; 3]| 299 * u32::from(c[0]) + 587 * u32::from(c[1]) + 114 * u32::from(c[2]);
        assert!(luma(color(0)) < luma(color(128)));
        assert!(luma(color(128)) < luma(color(255)));
    }
}
